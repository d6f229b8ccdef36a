use gcs_share::auth::{ADC_LOGIN_COMMAND, LOGIN_COMMAND};
use gcs_share::mcp::{SERVER_NAME, ShareServer};
use gcs_share::models::AuthStatus;
use gcs_share::operations::ShareManager;
use rmcp::ServiceExt;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

/// A line-framed JSON-RPC client talking to a server over an in-memory pipe.
struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
    next_id: u64,
}

impl Client {
    async fn start(manager: ShareManager) -> Self {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let running = ShareServer::new(manager).serve(server_io).await?;
            running.waiting().await?;
            anyhow::Ok(())
        });

        let (reader, writer) = tokio::io::split(client_io);
        let mut client = Self {
            lines: BufReader::new(reader).lines(),
            writer,
            next_id: 1,
        };
        let reply = client
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "integration", "version": "0" }
                }),
            )
            .await;
        assert_eq!(reply["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(reply["result"]["serverInfo"]["name"], json!(SERVER_NAME));
        assert!(reply["result"]["capabilities"]["tools"].is_object());

        client
            .send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
        client
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Sends a request and waits for the reply carrying its id.
    async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;

        loop {
            let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
                .await
                .expect("server did not answer in time")
                .unwrap()
                .expect("server closed the stream");
            let message: Value = serde_json::from_str(&line).unwrap();
            if message["id"] == json!(id) {
                return message;
            }
        }
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Value {
        self.request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
    }
}

/// The JSON document a tool returned as its text content.
fn document(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn lists_the_three_tools() {
    let env = test_setup!();
    let mut client = Client::start(env.manager()).await;

    let reply = client.request("tools/list", json!({})).await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    let names: BTreeSet<_> = tools
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        BTreeSet::from([
            "check_gcs_auth".to_string(),
            "list_buckets".to_string(),
            "share_file_public".to_string(),
        ])
    );

    let share = tools
        .iter()
        .find(|t| t["name"] == json!("share_file_public"))
        .unwrap();
    assert_eq!(share["inputSchema"]["required"], json!(["file_path"]));
}

#[tokio::test]
async fn share_tool_returns_public_url() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    let mut client = Client::start(env.manager()).await;

    let reply = client
        .call(
            "share_file_public",
            json!({ "file_path": path, "bucket_name": "demo-bucket" }),
        )
        .await;

    assert_eq!(reply["result"]["isError"], json!(false));
    assert!(reply["result"].get("structuredContent").is_none());
    let doc = document(&reply);
    assert_eq!(doc["success"], json!(true));
    assert_eq!(doc["created_bucket"], json!(true));
    assert_eq!(
        doc["public_url"],
        json!("https://storage.googleapis.com/demo-bucket/report.csv")
    );
}

#[tokio::test]
async fn share_tool_without_bucket_asks_for_one() {
    let env = test_setup!();
    let path = env.write_file("report.csv", "a,b\n");
    let mut client = Client::start(env.manager()).await;

    let reply = client
        .call("share_file_public", json!({ "file_path": path }))
        .await;

    assert_eq!(reply["result"]["isError"], json!(true));
    assert_eq!(document(&reply)["needs_input"], json!("bucket_name"));
    assert_eq!(env.connector.connects(), 0);
}

#[tokio::test]
async fn auth_failure_carries_remediation() {
    let env = test_setup!();
    env.store.reject_credentials(true);
    let mut client = Client::start(env.manager()).await;

    let reply = client.call("list_buckets", json!({})).await;

    assert_eq!(reply["result"]["isError"], json!(true));
    let doc = document(&reply);
    assert_eq!(doc["kind"], json!("auth"));
    assert_eq!(doc["needs_auth"], json!(true));
    assert_eq!(doc["remediation_steps"], json!([LOGIN_COMMAND, ADC_LOGIN_COMMAND]));
}

#[tokio::test]
async fn empty_bucket_list_is_a_success() {
    let env = test_setup!();
    let mut client = Client::start(env.manager()).await;

    let reply = client.call("list_buckets", json!({})).await;

    assert_eq!(reply["result"]["isError"], json!(false));
    let doc = document(&reply);
    assert_eq!(doc["success"], json!(true));
    assert_eq!(doc["buckets"], json!([]));
    assert_eq!(doc["message"], json!("Found 0 bucket(s)"));
}

#[tokio::test]
async fn check_auth_tool_reports_logged_out() {
    let env = test_setup!();
    let mut client = Client::start(env.manager_with_status(AuthStatus::logged_out())).await;

    let reply = client.call("check_gcs_auth", json!({})).await;

    assert_eq!(reply["result"]["isError"], json!(false));
    let doc = document(&reply);
    assert_eq!(doc["authenticated"], json!(false));
    assert_eq!(doc["remediation_steps"], json!([LOGIN_COMMAND, ADC_LOGIN_COMMAND]));
}

#[tokio::test]
async fn bad_tool_calls_are_protocol_errors() {
    let env = test_setup!();
    let mut client = Client::start(env.manager()).await;

    let reply = client.call("delete_everything", json!({})).await;
    assert!(reply["error"]["code"].is_i64(), "{reply}");
    assert!(reply.get("result").is_none());

    let reply = client
        .call("share_file_public", json!({ "bucket_name": "demo-bucket" }))
        .await;
    assert!(reply["error"]["code"].is_i64(), "{reply}");
    assert_eq!(env.connector.connects(), 0);

    // The session survives both errors.
    let reply = client.request("ping", json!({})).await;
    assert!(reply.get("error").is_none(), "{reply}");
}
