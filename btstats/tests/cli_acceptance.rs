use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    work: PathBuf,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let work = base.join("work");
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&work).expect("failed to create working dir");
        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            work,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.work.join("data/btlogs.db")
    }

    /// Write the store secret where the default config looks for it.
    fn write_store_url(&self) {
        fs::write(
            self.work.join(".storeurl"),
            format!("sqlite://{}\n", self.db_path().display()),
        )
        .expect("failed to write store url");
    }

    fn write_events(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.work.join(name);
        fs::write(&path, lines.join("\n")).expect("failed to write events");
        path
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("btstats"));

    Command::new(bin_path)
        .args(args)
        .current_dir(&env.work)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute btstats: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "btstats {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn recent_chat(nick: &str, msg: &str, emote: &str) -> String {
    let time = (chrono::Utc::now() - chrono::Duration::minutes(5)).to_rfc3339();
    serde_json::json!({
        "stream": "chatMsg",
        "time": time,
        "payload": {"msg": {"nick": nick, "msg": msg, "emote": emote}},
    })
    .to_string()
}

#[test]
fn import_then_query_reports_ranked_rows() {
    let env = CliTestEnv::new();
    env.write_store_url();

    let events = env.write_events(
        "events.jsonl",
        &[
            recent_chat("amy", "Soda", "drink"),
            recent_chat("bob", "soda", "drink"),
            recent_chat("cid", "Tea", "drink"),
        ],
    );
    let events_arg = events.to_str().unwrap();

    let import = run_bin(&env, &["import", events_arg]);
    assert_success(&["import", events_arg], &import);
    let import_stdout = String::from_utf8_lossy(&import.stdout);
    assert!(import_stdout.contains("Imported 3 event(s)"));
    assert!(env.db_path().exists());

    let query = run_bin(&env, &["query", "drinks"]);
    assert_success(&["query", "drinks"], &query);

    let stdout = String::from_utf8_lossy(&query.stdout);
    let rows: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("query output should be JSON");
    assert_eq!(rows[0]["_id"], "soda");
    assert_eq!(rows[0]["count"], 2);
    assert_eq!(rows[1]["_id"], "tea");
}

#[test]
fn actions_lists_registry() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["actions"]);
    assert_success(&["actions"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["chatters", "connected", "drinks", "emotes", "usercolors", "videos"] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
    assert!(stdout.contains("numConnected"));
}

#[test]
fn missing_store_url_file_is_fatal() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["query", "videos"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("store url file is required"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn unknown_action_fails_without_output() {
    let env = CliTestEnv::new();
    env.write_store_url();

    let events = env.write_events("events.jsonl", &[recent_chat("amy", "hi", "act")]);
    let import = run_bin(&env, &["import", events.to_str().unwrap()]);
    assert!(import.status.success());

    let output = run_bin(&env, &["query", "bogus"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown action: bogus"));
}
