//! Fail-closed validation pipeline for incoming commands.
//!
//! Only the command string is scanned. Arguments are handed to the child
//! as a discrete argv vector and never pass through a shell, so scanning
//! them would reject legitimate content (a grep pattern containing `;`)
//! without closing any actual hole. That asymmetry is deliberate and must
//! stay.

use std::collections::HashMap;

use super::ExecutorConfig;

/// Substrings that always reject a command, whatever the whitelist says.
pub const BLACKLIST_PATTERNS: &[&str] = &[
    "rm -rf",
    "mkfs",
    "dd ",
    "fdisk",
    "parted",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    ":(){:|:&};:",
];

/// Shell metacharacters that have no business in an argv-vector command.
pub const INJECTION_PATTERNS: &[&str] = &[";", "|", "&", "$(", "`", "\n", "\r", "\t"];

/// Run the four checks in order: injection, blacklist, allowed path,
/// whitelist. The first failure wins, so a command that smuggles a
/// blacklisted string behind a metacharacter is reported as injection.
pub fn validate_command(command: &str, config: &ExecutorConfig) -> Result<(), String> {
    if command.is_empty() {
        return Err("command is empty".to_string());
    }

    for pattern in INJECTION_PATTERNS {
        if command.contains(pattern) {
            return Err(format!("command contains injection pattern {pattern:?}"));
        }
    }

    for pattern in BLACKLIST_PATTERNS {
        if command.contains(pattern) {
            return Err(format!("command contains dangerous pattern {pattern:?}"));
        }
    }

    if command.starts_with('/') {
        // The executable is the part before any legacy compound-form
        // space; its directory must live under an allowed prefix.
        let executable = command.split(' ').next().unwrap_or(command);
        let dir = match executable.rfind('/') {
            Some(0) => "/",
            Some(index) => &executable[..index],
            None => "/",
        };
        let permitted = config
            .allowed_paths
            .iter()
            .any(|prefix| format!("{dir}/").starts_with(prefix) || dir.starts_with(prefix));
        if !permitted {
            return Err(format!("command directory {dir:?} is not in an allowed path"));
        }
    }

    if !config.whitelist.permits(command) {
        return Err("command is not whitelisted".to_string());
    }

    Ok(())
}

/// Environment entries must be line-safe; CR or LF in a name or value is
/// refused outright.
pub fn validate_env(env: &HashMap<String, String>) -> Result<(), String> {
    for (name, value) in env {
        if name.contains('\n') || name.contains('\r') || value.contains('\n') || value.contains('\r')
        {
            return Err(format!(
                "environment variable {name:?} contains line-break characters"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandWhitelist;

    fn test_config() -> ExecutorConfig {
        ExecutorConfig {
            whitelist: CommandWhitelist::Commands(vec![
                "/bin/ls".to_string(),
                "/bin/cat".to_string(),
            ]),
            ..ExecutorConfig::default()
        }
    }

    #[test]
    fn accepts_whitelisted_commands() {
        let config = test_config();
        assert!(validate_command("/bin/ls", &config).is_ok());
        // Legacy compound form: entry followed by a space.
        assert!(validate_command("/bin/cat /etc/hosts", &config).is_ok());
    }

    #[test]
    fn rejects_dangerous_patterns() {
        let config = test_config();
        for command in [
            "rm -rf /",
            "mkfs.ext4 /dev/sda",
            "dd if=/dev/zero of=/dev/sda",
            "fdisk /dev/sda",
            "parted /dev/sda",
            "shutdown -h now",
            "reboot",
            "halt",
            "poweroff",
        ] {
            let error = validate_command(command, &config).unwrap_err();
            assert!(
                error.contains("dangerous pattern"),
                "{command:?} gave: {error}"
            );
        }

        // The fork bomb is caught earlier, by the injection scan.
        assert!(validate_command(":(){:|:&};:", &config).is_err());
    }

    #[test]
    fn rejects_injection_characters() {
        let config = test_config();
        for command in [
            "/bin/ls; rm /tmp/x",
            "/bin/ls | wc -l",
            "/bin/ls & sleep 1",
            "/bin/ls $(whoami)",
            "/bin/ls `whoami`",
            "/bin/ls\n/bin/cat",
            "/bin/ls\r",
            "/bin/ls\t-la",
        ] {
            let error = validate_command(command, &config).unwrap_err();
            assert!(
                error.contains("injection pattern"),
                "{command:?} gave: {error}"
            );
        }
    }

    #[test]
    fn rejects_disallowed_paths() {
        let config = test_config();
        let error = validate_command("/tmp/script.sh", &config).unwrap_err();
        assert!(error.contains("allowed path"), "got: {error}");

        let error = validate_command("/opt/tools/run", &config).unwrap_err();
        assert!(error.contains("allowed path"), "got: {error}");
    }

    #[test]
    fn rejects_non_whitelisted_commands() {
        let config = test_config();
        let error = validate_command("/usr/bin/vim", &config).unwrap_err();
        assert!(error.contains("not whitelisted"), "got: {error}");

        // Prefix alone is not enough without the space separator.
        let error = validate_command("/bin/lsblk", &config).unwrap_err();
        assert!(error.contains("not whitelisted"), "got: {error}");
    }

    #[test]
    fn allow_all_still_applies_earlier_checks() {
        let config = ExecutorConfig {
            whitelist: CommandWhitelist::AllowAll,
            ..ExecutorConfig::default()
        };
        assert!(validate_command("/usr/bin/vim", &config).is_ok());
        assert!(validate_command("rm -rf /tmp", &config).is_err());
        assert!(validate_command("/bin/ls;id", &config).is_err());
    }

    #[test]
    fn every_forbidden_pattern_rejects_wherever_it_appears() {
        // Whitelist disabled so only the scans decide.
        let config = ExecutorConfig {
            whitelist: CommandWhitelist::AllowAll,
            ..ExecutorConfig::default()
        };

        for pattern in BLACKLIST_PATTERNS.iter().chain(INJECTION_PATTERNS) {
            for command in [
                format!("/bin/ls {pattern}"),
                format!("{pattern} --now"),
                format!("x{pattern}x"),
            ] {
                assert!(
                    validate_command(&command, &config).is_err(),
                    "{command:?} was not rejected"
                );
            }
        }
    }

    #[test]
    fn env_rejects_line_breaks() {
        let mut env = HashMap::new();
        env.insert("SAFE".to_string(), "value".to_string());
        assert!(validate_env(&env).is_ok());

        env.insert("EVIL".to_string(), "a\nb".to_string());
        assert!(validate_env(&env).is_err());

        let mut env = HashMap::new();
        env.insert("EV\rIL".to_string(), "x".to_string());
        assert!(validate_env(&env).is_err());
    }
}
