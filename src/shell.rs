use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::env_vars::EnvVars;
use crate::error::{Error, Result};
use crate::fs::write_atomic;

/// The markers bracketing the managed block in an rc file. Re-init and
/// uninstall locate and replace exactly this region.
pub const MARKER_BEGIN: &str = "# >>> govman initialize >>>";
pub const MARKER_END: &str = "# <<< govman initialize <<<";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell", alias = "pwsh")]
    PowerShell,
    Cmd,
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shell::Bash => f.write_str("bash"),
            Shell::Zsh => f.write_str("zsh"),
            Shell::Fish => f.write_str("fish"),
            Shell::PowerShell => f.write_str("powershell"),
            Shell::Cmd => f.write_str("cmd"),
        }
    }
}

impl FromStr for Shell {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bash" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            "fish" => Ok(Shell::Fish),
            "powershell" | "pwsh" => Ok(Shell::PowerShell),
            "cmd" => Ok(Shell::Cmd),
            _ => Err(Error::ShellUnknown),
        }
    }
}

impl Shell {
    /// Detect the caller's shell from the environment.
    pub fn detect() -> Option<Shell> {
        if let Some(shell) = std::env::var_os(EnvVars::SHELL) {
            let shell = PathBuf::from(shell);
            let name = shell.file_name()?.to_str()?;
            return name.parse().ok();
        }
        if cfg!(windows) {
            return Some(Shell::PowerShell);
        }
        None
    }

    /// The PATH-update statement `govman use` prints for this dialect.
    ///
    /// This is the only string the shell wrapper will ever evaluate, and only
    /// after it matches [`Shell::validation_regex`].
    pub fn path_export(&self, bin_dir: &Path) -> String {
        let dir = bin_dir.display();
        match self {
            Shell::Bash | Shell::Zsh => format!(r#"export PATH="{dir}:$PATH""#),
            Shell::Fish => format!(r#"set -gx PATH "{dir}" $PATH"#),
            Shell::PowerShell => format!(r#"$env:Path = "{dir};" + $env:Path"#),
            Shell::Cmd => format!("set PATH={dir};%PATH%"),
        }
    }

    /// The anchored pattern a PATH-update statement must match before the
    /// wrapper evaluates it. The directory class excludes every character
    /// that could terminate the string or trigger substitution in the
    /// dialect, so arbitrary tool output can never reach `eval`.
    pub fn validation_regex(&self) -> &'static str {
        match self {
            Shell::Bash | Shell::Zsh => r#"^export PATH="[^"`$;|&<>]+:\$PATH"$"#,
            Shell::Fish => r#"^set -gx PATH "[^"`$;|&<>]+" \$PATH$"#,
            Shell::PowerShell => r#"^\$env:Path = "[^"`$;|&<>]+;" \+ \$env:Path$"#,
            Shell::Cmd => r"^set PATH=[^;&|<>%]+;%PATH%$",
        }
    }

    /// The rc file the integration block is installed into.
    pub fn rc_file(&self, home: &Path) -> Option<PathBuf> {
        match self {
            Shell::Bash => Some(home.join(".bashrc")),
            Shell::Zsh => {
                let zdotdir = std::env::var_os("ZDOTDIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home.to_path_buf());
                Some(zdotdir.join(".zshrc"))
            }
            Shell::Fish => Some(home.join(".config").join("fish").join("config.fish")),
            Shell::PowerShell => {
                if cfg!(windows) {
                    Some(
                        home.join("Documents")
                            .join("PowerShell")
                            .join("Microsoft.PowerShell_profile.ps1"),
                    )
                } else {
                    Some(
                        home.join(".config")
                            .join("powershell")
                            .join("Microsoft.PowerShell_profile.ps1"),
                    )
                }
            }
            Shell::Cmd => None,
        }
    }

    /// Render the marker-bracketed integration block.
    ///
    /// The tool's bin directory is the only interpolation; everything else in
    /// the template is fixed, including the validation pattern and the
    /// config-file extraction used by the autoswitch hook.
    pub fn render_init(&self, bin_dir: &Path) -> String {
        let template = match self {
            Shell::Bash => BASH_INIT,
            Shell::Zsh => ZSH_INIT,
            Shell::Fish => FISH_INIT,
            Shell::PowerShell => POWERSHELL_INIT,
            Shell::Cmd => CMD_INIT,
        };
        template.replace("__GOVMAN_BIN__", &bin_dir.display().to_string())
    }
}

const BASH_INIT: &str = r#"# >>> govman initialize >>>
case ":$PATH:" in
    *":__GOVMAN_BIN__:"*) ;;
    *) export PATH="__GOVMAN_BIN__:$PATH" ;;
esac
export GOTOOLCHAIN=local

govman() {
    if [ "$1" = "use" ]; then
        local out rc re
        out="$(command govman "$@")"
        rc=$?
        if [ $rc -ne 0 ]; then
            [ -n "$out" ] && printf '%s\n' "$out" >&2
            return $rc
        fi
        re='^export PATH="[^"`$;|&<>]+:\$PATH"$'
        if [[ "$out" =~ $re ]]; then
            eval "$out"
        else
            [ -n "$out" ] && printf '%s\n' "$out" >&2
        fi
    else
        command govman "$@"
    fi
}

__govman_auto_enabled() {
    local cfg="${GOVMAN_HOME:-$HOME/.govman}/config.yaml"
    [ -f "$cfg" ] || return 0
    awk '
        /^[[:space:]]*auto_switch:/ { section = 1; next }
        section && /^[^[:space:]#]/ { exit }
        section && /^[[:space:]]*enabled:[[:space:]]*false[[:space:]]*$/ { off = 1; exit }
        END { exit off }
    ' "$cfg"
}

__govman_autoswitch() {
    [ "$PWD" = "${__GOVMAN_LAST_PWD-}" ] && return 0
    __GOVMAN_LAST_PWD="$PWD"
    __govman_auto_enabled || return 0
    local dir="$PWD" pin=""
    while :; do
        if [ -f "$dir/.govman-goversion" ]; then
            pin="$(head -n 1 "$dir/.govman-goversion" | tr -d '[:space:]')"
            break
        fi
        [ "$dir" = "/" ] && break
        dir="${dir%/*}"
        [ -n "$dir" ] || dir="/"
    done
    [ -n "$pin" ] || return 0
    printf '%s' "$pin" | grep -Eq '^[0-9]+\.[0-9]+(\.[0-9]+)?$' || return 0
    local current
    current="$(go version 2>/dev/null | sed -En 's/.*go([0-9]+\.[0-9]+(\.[0-9]+)?).*/\1/p')"
    [ "$pin" = "$current" ] && return 0
    govman use "$pin"
}

case ";${PROMPT_COMMAND-};" in
    *";__govman_autoswitch;"*) ;;
    *) PROMPT_COMMAND="__govman_autoswitch${PROMPT_COMMAND:+;$PROMPT_COMMAND}" ;;
esac
# <<< govman initialize <<<
"#;

const ZSH_INIT: &str = r#"# >>> govman initialize >>>
case ":$PATH:" in
    *":__GOVMAN_BIN__:"*) ;;
    *) export PATH="__GOVMAN_BIN__:$PATH" ;;
esac
export GOTOOLCHAIN=local

govman() {
    if [ "$1" = "use" ]; then
        local out rc re
        out="$(command govman "$@")"
        rc=$?
        if [ $rc -ne 0 ]; then
            [ -n "$out" ] && printf '%s\n' "$out" >&2
            return $rc
        fi
        re='^export PATH="[^"`$;|&<>]+:\$PATH"$'
        if [[ "$out" =~ $re ]]; then
            eval "$out"
        else
            [ -n "$out" ] && printf '%s\n' "$out" >&2
        fi
    else
        command govman "$@"
    fi
}

__govman_auto_enabled() {
    local cfg="${GOVMAN_HOME:-$HOME/.govman}/config.yaml"
    [ -f "$cfg" ] || return 0
    awk '
        /^[[:space:]]*auto_switch:/ { section = 1; next }
        section && /^[^[:space:]#]/ { exit }
        section && /^[[:space:]]*enabled:[[:space:]]*false[[:space:]]*$/ { off = 1; exit }
        END { exit off }
    ' "$cfg"
}

__govman_autoswitch() {
    __govman_auto_enabled || return 0
    local dir="$PWD" pin=""
    while :; do
        if [ -f "$dir/.govman-goversion" ]; then
            pin="$(head -n 1 "$dir/.govman-goversion" | tr -d '[:space:]')"
            break
        fi
        [ "$dir" = "/" ] && break
        dir="${dir%/*}"
        [ -n "$dir" ] || dir="/"
    done
    [ -n "$pin" ] || return 0
    printf '%s' "$pin" | grep -Eq '^[0-9]+\.[0-9]+(\.[0-9]+)?$' || return 0
    local current
    current="$(go version 2>/dev/null | sed -En 's/.*go([0-9]+\.[0-9]+(\.[0-9]+)?).*/\1/p')"
    [ "$pin" = "$current" ] && return 0
    govman use "$pin"
}

if [[ " ${chpwd_functions[*]-} " != *" __govman_autoswitch "* ]]; then
    chpwd_functions+=(__govman_autoswitch)
fi
__govman_autoswitch
# <<< govman initialize <<<
"#;

const FISH_INIT: &str = r#"# >>> govman initialize >>>
if not contains -- "__GOVMAN_BIN__" $PATH
    set -gx PATH "__GOVMAN_BIN__" $PATH
end
set -gx GOTOOLCHAIN local

function govman
    if test (count $argv) -ge 1; and test "$argv[1]" = use
        set -l out (command govman $argv | string collect)
        set -l rc $status
        if test $rc -ne 0
            test -n "$out"; and printf '%s\n' "$out" >&2
            return $rc
        end
        if string match -rq '^set -gx PATH "[^"`$;|&<>]+" \$PATH$' -- "$out"
            eval "$out"
        else
            test -n "$out"; and printf '%s\n' "$out" >&2
        end
    else
        command govman $argv
    end
end

function __govman_auto_enabled
    set -l home "$GOVMAN_HOME"
    test -z "$home"; and set home "$HOME/.govman"
    set -l cfg "$home/config.yaml"
    test -f "$cfg"; or return 0
    awk '
        /^[[:space:]]*auto_switch:/ { section = 1; next }
        section && /^[^[:space:]#]/ { exit }
        section && /^[[:space:]]*enabled:[[:space:]]*false[[:space:]]*$/ { off = 1; exit }
        END { exit off }
    ' "$cfg"
end

function __govman_autoswitch --on-variable PWD
    status --is-command-substitution; and return
    __govman_auto_enabled; or return
    set -l dir "$PWD"
    set -l pin ""
    while true
        if test -f "$dir/.govman-goversion"
            set pin (head -n 1 "$dir/.govman-goversion" | string trim)
            break
        end
        test "$dir" = "/"; and break
        set dir (dirname "$dir")
    end
    test -n "$pin"; or return
    string match -rq '^[0-9]+\.[0-9]+(\.[0-9]+)?$' -- "$pin"; or return
    set -l current (go version 2>/dev/null | string match -r 'go([0-9]+\.[0-9]+(?:\.[0-9]+)?)' | tail -n 1)
    test "$pin" = "$current"; and return
    govman use "$pin"
end
# <<< govman initialize <<<
"#;

const POWERSHELL_INIT: &str = r#"# >>> govman initialize >>>
if (-not ($env:Path -split [IO.Path]::PathSeparator -contains "__GOVMAN_BIN__")) {
    $env:Path = "__GOVMAN_BIN__" + [IO.Path]::PathSeparator + $env:Path
}
$env:GOTOOLCHAIN = "local"

function govman {
    $exe = Get-Command -Name govman -CommandType Application -ErrorAction SilentlyContinue |
        Select-Object -First 1
    if (-not $exe) {
        Write-Error "govman binary not found on PATH"
        return
    }
    if ($args.Count -ge 1 -and $args[0] -eq 'use') {
        $out = (& $exe.Source @args | Out-String).TrimEnd()
        $code = $LASTEXITCODE
        if ($code -ne 0) {
            if ($out) { [Console]::Error.WriteLine($out) }
            $global:LASTEXITCODE = $code
            return
        }
        if ($out -match '^\$env:Path = "[^"`$;|&<>]+;" \+ \$env:Path$') {
            Invoke-Expression $out
        } elseif ($out) {
            [Console]::Error.WriteLine($out)
        }
    } else {
        & $exe.Source @args
    }
}

function global:__govman-Autoswitch {
    $dir = (Get-Location).Path
    $pin = $null
    while ($dir) {
        $candidate = Join-Path $dir ".govman-goversion"
        if (Test-Path -LiteralPath $candidate -PathType Leaf) {
            $pin = (Get-Content -LiteralPath $candidate -First 1).Trim()
            break
        }
        $parent = Split-Path -Parent $dir
        if (-not $parent -or $parent -eq $dir) { break }
        $dir = $parent
    }
    if (-not $pin) { return }
    if ($pin -notmatch '^[0-9]+\.[0-9]+(\.[0-9]+)?$') { return }
    $current = $null
    $versionOutput = & go version 2>$null
    if ($versionOutput -match 'go([0-9]+\.[0-9]+(\.[0-9]+)?)') {
        $current = $Matches[1]
    }
    if ($pin -ne $current) {
        govman use $pin
    }
}

if (-not $global:__govmanPromptHooked) {
    $global:__govmanPromptHooked = $true
    $global:__govmanPreviousPrompt = $function:prompt
    function global:prompt {
        __govman-Autoswitch
        & $global:__govmanPreviousPrompt
    }
}
# <<< govman initialize <<<
"#;

const CMD_INIT: &str = r#"REM >>> govman initialize >>>
REM cmd.exe offers no directory-change hook; only the PATH update is applied.
set PATH=__GOVMAN_BIN__;%PATH%
set GOTOOLCHAIN=local
REM <<< govman initialize <<<
"#;

/// Install (or replace) the integration block in an rc file.
///
/// The existing block, if any, is removed first, so re-running `init` never
/// duplicates hooks. The file is rewritten atomically.
pub fn install_into_rc(rc: &Path, block: &str) -> Result<()> {
    let existing = match fs_err::read_to_string(rc) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    let mut contents = strip_block(&existing);
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    if !contents.is_empty() {
        contents.push('\n');
    }
    contents.push_str(block);

    if let Some(parent) = rc.parent() {
        fs_err::create_dir_all(parent)?;
    }
    write_atomic(rc, contents)?;
    debug!(path = %rc.display(), "Installed shell integration");
    Ok(())
}

/// Remove the integration block from an rc file. Returns whether one existed.
pub fn remove_from_rc(rc: &Path) -> Result<bool> {
    let existing = match fs_err::read_to_string(rc) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    let stripped = strip_block(&existing);
    if stripped == existing {
        return Ok(false);
    }
    write_atomic(rc, stripped)?;
    debug!(path = %rc.display(), "Removed shell integration");
    Ok(true)
}

/// Drop every line between the markers, inclusive.
fn strip_block(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut inside = false;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.ends_with(">>> govman initialize >>>") {
            inside = true;
            continue;
        }
        if trimmed.ends_with("<<< govman initialize <<<") {
            inside = false;
            continue;
        }
        if !inside {
            out.push_str(line);
            out.push('\n');
        }
    }
    // Collapse the blank line the block was padded with.
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Shell; 5] = [
        Shell::Bash,
        Shell::Zsh,
        Shell::Fish,
        Shell::PowerShell,
        Shell::Cmd,
    ];

    #[test]
    fn path_export_matches_own_validation_regex() {
        let bin = Path::new("/home/user/.govman/bin");
        for shell in ALL {
            let statement = shell.path_export(bin);
            let re = regex::Regex::new(shell.validation_regex()).unwrap();
            assert!(
                re.is_match(&statement),
                "{shell}: `{statement}` must match `{}`",
                shell.validation_regex()
            );
        }
    }

    #[test]
    fn validation_regex_rejects_injection() {
        for shell in ALL {
            let re = regex::Regex::new(shell.validation_regex()).unwrap();
            for evil in [
                r#"export PATH="$(rm -rf ~):$PATH""#,
                r#"export PATH="`touch /tmp/pwn`:$PATH""#,
                r#"export PATH="/bin:$PATH"; rm -rf ~"#,
                "rm -rf ~",
                "export PATH=\"/bin:$PATH\"\nrm -rf ~",
                r#"$env:Path = "$(Remove-Item -Recurse ~);" + $env:Path"#,
            ] {
                assert!(!re.is_match(evil), "{shell} regex must reject `{evil}`");
            }
        }
    }

    #[test]
    fn init_block_is_bracketed_and_interpolates_only_the_bin_dir() {
        let bin = Path::new("/home/user/.govman/bin");
        for shell in ALL {
            let block = shell.render_init(bin);
            assert!(block.contains("govman initialize >>>"), "{shell}");
            assert!(block.contains("govman initialize <<<"), "{shell}");
            assert!(block.contains("/home/user/.govman/bin"), "{shell}");
            assert!(!block.contains("__GOVMAN_BIN__"), "{shell}");
            assert!(block.contains("GOTOOLCHAIN"), "{shell}");
        }
    }

    #[test]
    fn hooked_shells_guard_their_registration() {
        let bin = Path::new("/opt/govman/bin");
        // Each dialect carries its idempotency sentinel.
        assert!(Shell::Bash.render_init(bin).contains(r#"*";__govman_autoswitch;"*"#));
        assert!(Shell::Zsh
            .render_init(bin)
            .contains(r#"" ${chpwd_functions[*]-} " != *" __govman_autoswitch "*"#));
        assert!(Shell::PowerShell
            .render_init(bin)
            .contains("__govmanPromptHooked"));
        // Fish re-defines the function by name, which replaces the handler.
        assert!(Shell::Fish
            .render_init(bin)
            .contains("function __govman_autoswitch --on-variable PWD"));
    }

    #[test]
    fn rc_install_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let rc = dir.path().join(".bashrc");
        fs_err::write(&rc, "alias ll='ls -l'\n")?;

        let block = Shell::Bash.render_init(Path::new("/opt/govman/bin"));
        install_into_rc(&rc, &block)?;
        install_into_rc(&rc, &block)?;

        let contents = fs_err::read_to_string(&rc)?;
        assert_eq!(contents.matches(MARKER_BEGIN).count(), 1);
        assert_eq!(contents.matches(MARKER_END).count(), 1);
        assert!(contents.starts_with("alias ll='ls -l'\n"));
        Ok(())
    }

    #[test]
    fn rc_remove_restores_the_original() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let rc = dir.path().join(".bashrc");
        fs_err::write(&rc, "alias ll='ls -l'\n")?;

        let block = Shell::Bash.render_init(Path::new("/opt/govman/bin"));
        install_into_rc(&rc, &block)?;
        assert!(remove_from_rc(&rc)?);
        assert!(!remove_from_rc(&rc)?);

        let contents = fs_err::read_to_string(&rc)?;
        assert_eq!(contents, "alias ll='ls -l'\n");
        Ok(())
    }

    #[test]
    fn detect_parses_shell_from_env_value() {
        assert_eq!("bash".parse::<Shell>().unwrap(), Shell::Bash);
        assert_eq!("pwsh".parse::<Shell>().unwrap(), Shell::PowerShell);
        assert!("tcsh".parse::<Shell>().is_err());
    }
}
