//! Agent configuration and the on-disk artifacts installers wire into
//! host tools.
//!
//! Each registered agent owns a directory `${HOME}/.elydora/<agent_id>/`
//! holding:
//!
//! - `config.json` -- identity and endpoint settings (mode 0600);
//! - `private.key` -- the raw base64url seed (mode 0600);
//! - `hook.js`    -- post-action hook that records an operation (0755);
//! - `guard.js`   -- pre-action gate that enforces freeze/revocation (0755).
//!
//! The scripts are thin wrappers that shell out to the `elydora` binary,
//! so the signing pipeline exists in exactly one implementation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-user root directory under `$HOME`.
pub const ROOT_DIR_NAME: &str = ".elydora";

/// File names inside an agent directory.
pub const CONFIG_FILE: &str = "config.json";
pub const PRIVATE_KEY_FILE: &str = "private.key";
pub const HOOK_FILE: &str = "hook.js";
pub const GUARD_FILE: &str = "guard.js";

/// Persistent per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub org_id: String,
    pub agent_id: String,
    pub kid: String,
    pub base_url: String,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The directory owning one agent's artifacts.
pub fn agent_dir(agent_id: &str) -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::validation("cannot determine home directory"))?;
    Ok(home.join(ROOT_DIR_NAME).join(agent_id))
}

impl AgentConfig {
    /// Load `config.json` from an agent directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::validation(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::validation(format!("malformed {}: {}", path.display(), e)))
    }

    /// Write `config.json` into an agent directory, creating the directory
    /// if needed. The file is owner-readable only.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::validation(format!("cannot create {}: {}", dir.display(), e)))?;
        let path = dir.join(CONFIG_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::validation(format!("unserializable config: {}", e)))?;
        write_private_file(&path, text.as_bytes())
    }
}

/// Write the raw base64url seed into `private.key`, owner-readable only.
pub fn save_private_key(dir: &Path, seed_b64u: &str) -> Result<()> {
    // Validate before persisting: a corrupt seed caught here beats one
    // caught at first signing.
    crate::crypto::SigningKey::from_b64u(seed_b64u)?;
    fs::create_dir_all(dir)
        .map_err(|e| Error::validation(format!("cannot create {}: {}", dir.display(), e)))?;
    write_private_file(&dir.join(PRIVATE_KEY_FILE), seed_b64u.trim().as_bytes())
}

/// Read the base64url seed from `private.key`.
pub fn load_private_key(dir: &Path) -> Result<String> {
    let path = dir.join(PRIVATE_KEY_FILE);
    let text = fs::read_to_string(&path)
        .map_err(|e| Error::validation(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(text.trim().to_string())
}

/// Write the `hook.js` and `guard.js` artifacts installers reference from
/// host-tool configuration.
pub fn write_hook_scripts(dir: &Path, agent_id: &str) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::validation(format!("cannot create {}: {}", dir.display(), e)))?;
    write_executable_file(
        &dir.join(HOOK_FILE),
        render_script(HOOK_TEMPLATE, agent_id).as_bytes(),
    )?;
    write_executable_file(
        &dir.join(GUARD_FILE),
        render_script(GUARD_TEMPLATE, agent_id).as_bytes(),
    )
}

fn render_script(template: &str, agent_id: &str) -> String {
    template.replace("__AGENT_ID__", agent_id)
}

fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, 0o600)
}

fn write_executable_file(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, 0o755)
}

#[cfg(unix)]
fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, contents)
        .map_err(|e| Error::validation(format!("cannot write {}: {}", path.display(), e)))?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::validation(format!("cannot chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn write_with_mode(path: &Path, contents: &[u8], _mode: u32) -> Result<()> {
    fs::write(path, contents)
        .map_err(|e| Error::validation(format!("cannot write {}: {}", path.display(), e)))
}

/// Post-action hook: records what the host tool just did.
const HOOK_TEMPLATE: &str = r#"#!/usr/bin/env node
// Posts an operation record for the action the host tool just performed.
// Reads the event JSON from stdin and forwards it as the payload.
const { execFileSync } = require("child_process");

let input = "";
process.stdin.on("data", (chunk) => (input += chunk));
process.stdin.on("end", () => {
  const event = input.trim() ? input : "null";
  try {
    execFileSync(
      "elydora",
      ["submit", "--agent", "__AGENT_ID__", "--type", "host.action", "--payload", "-"],
      { input: event, stdio: ["pipe", "inherit", "inherit"] }
    );
  } catch (err) {
    // Recording must never break the host tool.
    process.exit(0);
  }
});
"#;

/// Pre-action gate: refuses to proceed for frozen agents or revoked keys.
const GUARD_TEMPLATE: &str = r#"#!/usr/bin/env node
// Blocks the host tool's action when the agent is frozen or its key has
// been revoked. Exit 0 allows the action, non-zero blocks it.
const { execFileSync } = require("child_process");

try {
  execFileSync("elydora", ["guard-check", "--agent", "__AGENT_ID__"], {
    stdio: ["ignore", "inherit", "inherit"],
  });
  process.exit(0);
} catch (err) {
  process.exit(1);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::b64u_encode;

    fn test_config() -> AgentConfig {
        AgentConfig {
            org_id: "org-1".to_string(),
            agent_id: "agent-1".to_string(),
            kid: "agent-1-key-v1".to_string(),
            base_url: "https://api.elydora.com".to_string(),
            agent_name: "ci-agent".to_string(),
            token: None,
        }
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        test_config().save(dir.path()).unwrap();
        let loaded = AgentConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.agent_id, "agent-1");
        assert_eq!(loaded.kid, "agent-1-key-v1");
        assert!(loaded.token.is_none());
    }

    #[test]
    fn test_absent_token_not_serialized() {
        let json = serde_json::to_string(&test_config()).unwrap();
        assert!(!json.contains("token"));
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        test_config().save(dir.path()).unwrap();
        save_private_key(dir.path(), &b64u_encode([9u8; 32])).unwrap();

        for name in [CONFIG_FILE, PRIVATE_KEY_FILE] {
            let mode = std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{} has mode {:o}", name, mode);
        }
    }

    #[test]
    fn test_private_key_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let seed = b64u_encode([9u8; 32]);
        save_private_key(dir.path(), &seed).unwrap();
        assert_eq!(load_private_key(dir.path()).unwrap(), seed);
    }

    #[test]
    fn test_bad_seed_never_persisted() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_private_key(dir.path(), "too-short").is_err());
        assert!(!dir.path().join(PRIVATE_KEY_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_hook_scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_hook_scripts(dir.path(), "agent-1").unwrap();
        for name in [HOOK_FILE, GUARD_FILE] {
            let path = dir.path().join(name);
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755, "{} has mode {:o}", name, mode);
            let body = std::fs::read_to_string(&path).unwrap();
            assert!(body.contains("agent-1"));
            assert!(body.starts_with("#!/usr/bin/env node"));
        }
    }
}
