use std::process::Command;
use tempfile::TempDir;

fn parsewatch(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_parsewatch"))
        .args(args)
        .current_dir(dir)
        .env_remove("PARSEWATCH_CONFIG")
        .output()
        .expect("Failed to run parsewatch")
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = parsewatch(temp_dir.path(), &["init"]);
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".parsewatch/settings.toml");
    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[queue]"));
    assert!(content.contains("# [[parsers]]"));

    // Second init without --force refuses to overwrite
    let output = parsewatch(temp_dir.path(), &["init"]);
    assert!(!output.status.success());

    let output = parsewatch(temp_dir.path(), &["init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".parsewatch");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2

[queue]
max_attempts = 7

[[parsers]]
variant = "write-time"
parser_name = "reports"
directory_to_watch = "in"
file_search_pattern = "csv"
working_directory_path = "work"
backup_directory_path = "backup"
"#;
    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = parsewatch(temp_dir.path(), &["config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("max_attempts = 7"));
    assert!(stdout.contains("parser_name = \"reports\""));
}

#[test]
fn test_scan_previews_without_advancing() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join(".parsewatch")).unwrap();
    std::fs::create_dir_all(root.join("in")).unwrap();
    std::fs::write(root.join("in").join("a.csv"), "1").unwrap();
    std::fs::write(root.join("in").join("b.txt"), "2").unwrap();

    let config = format!(
        r#"
[[parsers]]
variant = "write-time"
parser_name = "reports"
directory_to_watch = "{}"
file_search_pattern = '\.csv$'
working_directory_path = "work"
backup_directory_path = "backup"
"#,
        root.join("in").display()
    );
    std::fs::write(root.join(".parsewatch").join("settings.toml"), config).unwrap();

    for _ in 0..2 {
        let output = parsewatch(root, &["scan", "reports"]);
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert!(stdout.contains("a.csv"));
        assert!(!stdout.contains("b.txt"));
    }

    let output = parsewatch(root, &["watermarks"]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("No watermarks stored"));

    let output = parsewatch(root, &["scan", "missing"]);
    assert!(!output.status.success());
}
