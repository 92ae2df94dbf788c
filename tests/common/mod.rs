#![allow(dead_code)]

pub mod mocks;

use std::fs;
use switchboard::SwitchboardConfig;
use tempfile::TempDir;

pub const TEACHER_PERSONA: &str = "You are a patient teacher.";

const CONFIG: &str = r#"
base_model = "scripted-base"

[router]
model_path = "models/router_agent"

[agents.teacher]
description = "Explains concepts and does arithmetic"
prompt_file = "prompts/teacher.txt"
model_path = "models/teacher"
tools_whitelist = ["calculate_simple_interest", "get_current_date"]

[agents.programmer]
description = "Writes code"
prompt_file = "prompts/programmer.txt"
model_path = "models/programmer"

[queue]
backend = "memory"

[safety.force_local_on_pii]
enabled = true
patterns = [{ name = "email", regex = '[\w.+-]+@[\w-]+\.[\w.]+' }]

[safety.block_on_dangerous_content]
enabled = true
keywords = ["build a bomb", "forbidden word"]
"#;

/// A config directory with personas and adapter directories for both agents.
///
/// Keep the `TempDir` alive for as long as the config is used.
pub fn workspace() -> (TempDir, SwitchboardConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("prompts")).unwrap();
    fs::write(root.join("prompts/teacher.txt"), TEACHER_PERSONA).unwrap();
    fs::write(root.join("prompts/programmer.txt"), "You write Rust.").unwrap();
    for adapter in ["router_agent", "teacher", "programmer"] {
        fs::create_dir_all(root.join("models").join(adapter)).unwrap();
    }

    let path = root.join("switchboard.toml");
    fs::write(&path, CONFIG).unwrap();
    let config = SwitchboardConfig::load(&path).unwrap();
    config.validate().unwrap();
    (dir, config)
}
