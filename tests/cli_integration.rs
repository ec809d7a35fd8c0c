use serde_json::Value;
use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let messages = dir.path().join("package").join("messages");
        fs::create_dir_all(messages.join("c100")).unwrap();
        fs::write(messages.join("index.json"), r#"{"100": "general in Test Server"}"#).unwrap();
        fs::write(
            messages.join("c100").join("messages.csv"),
            "ID,Timestamp,Contents,Attachments\n1,2021-01-01 10:00:00,first,\n2,2021-01-01 10:01:00,second,\n",
        )
        .unwrap();
        Self { dir }
    }

    fn archive(&self) -> String {
        self.dir.path().join("package").display().to_string()
    }

    fn command(&self, api_base_url: &str) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_scrubber"));
        command
            .env("SCRUBBER_DATA_DIR", self.dir.path().join("data"))
            .env("SCRUBBER_API_BASE_URL", api_base_url)
            .env("SCRUBBER_TOKEN", "test-token")
            .env("SCRUBBER_PACING_MS", "0")
            .env_remove("SCRUBBER_LEDGER_PATH")
            .env_remove("SCRUBBER_SECRETS_PATH");
        command
    }

    fn ledger_exists(&self) -> bool {
        self.dir.path().join("data").join("ledger.db").is_file()
    }
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "scrubber failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be valid json")
}

async fn run(mut command: Command) -> Output {
    tokio::task::spawn_blocking(move || command.output().expect("failed to execute scrubber"))
        .await
        .expect("join")
}

#[tokio::test(flavor = "multi_thread")]
async fn channels_lists_index_names() {
    let fixture = Fixture::new();
    let mut command = fixture.command("http://127.0.0.1:9");
    command.args(["channels", "--json", "--archive", &fixture.archive()]);

    let value = json_stdout(&run(command).await);
    let channels = value["channels"].as_array().expect("channels array");
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["displayName"], "general in Test Server");
    assert_eq!(channels[0]["messageCount"], 2);
    assert_eq!(channels[0]["deletedCount"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_index_fails() {
    let fixture = Fixture::new();
    let mut command = fixture.command("http://127.0.0.1:9");
    command.args(["channels", "--archive", &fixture.dir.path().display().to_string()]);

    let output = run(command).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("index.json not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_twice_only_calls_remote_once_per_message() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/channels/100/messages/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/channels/100/messages/2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut first = fixture.command(&server.uri());
    first.args(["delete", "--json", "--yes", "--all", "--channel", "c100", "--archive", &fixture.archive()]);
    let summary = json_stdout(&run(first).await);
    assert_eq!(summary["succeeded"], serde_json::json!(["1", "2"]));
    assert!(fixture.ledger_exists());

    let mut second = fixture.command(&server.uri());
    second.args(["delete", "--json", "--yes", "--all", "--channel", "100", "--archive", &fixture.archive()]);
    let summary = json_stdout(&run(second).await);
    assert_eq!(summary["skipped"], serde_json::json!(["1", "2"]));
    assert_eq!(summary["succeeded"], serde_json::json!([]));

    let mut stats = fixture.command(&server.uri());
    stats.args(["ledger", "stats", "--json", "--channel", "100"]);
    let stats = json_stdout(&run(stats).await);
    assert_eq!(stats["deleted"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_delete_exits_non_zero_with_summary() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(serde_json::json!({"message": "Missing Access", "code": 50001})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut command = fixture.command(&server.uri());
    command.args([
        "delete",
        "--json",
        "--yes",
        "--channel",
        "100",
        "--message-id",
        "2",
        "--archive",
        &fixture.archive(),
    ]);
    let output = run(command).await;

    assert!(!output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["failed"][0]["messageId"], "2");
    assert_eq!(summary["failed"][0]["reason"]["kind"], "remoteRejected");
    assert_eq!(summary["failed"][0]["reason"]["status"], 403);
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_reports_config() {
    let fixture = Fixture::new();
    let mut command = fixture.command("http://127.0.0.1:9/");
    command.args(["doctor", "--compact"]);

    let value = json_stdout(&run(command).await);
    assert_eq!(value["cfg"]["apiBaseUrl"], "http://127.0.0.1:9");
    assert_eq!(value["cfg"]["pacingMs"], 0);
    assert_eq!(value["cfg"]["maxRetries"], 5);
}
