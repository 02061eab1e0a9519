use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_audio::SimulatedBackend;
use cadence_bridge::BridgeHost;
use cadence_core::PlayerSettings;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::time::{sleep, Instant};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Write::write(&mut *self.0.lock().unwrap(), buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn messages(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn events(&self, method: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["method"] == method)
            .collect()
    }

    async fn wait_for(&self, pred: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(found) = self.messages().into_iter().find(|m| pred(m)) {
                return found;
            }
            assert!(Instant::now() < deadline, "timed out waiting for message");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn response(&self, id: u64) -> Value {
        self.wait_for(|m| m["id"] == id && m.get("result").is_some())
            .await["result"]
            .clone()
    }
}

fn host(output: &SharedBuffer) -> BridgeHost {
    BridgeHost::new(
        output.clone(),
        Arc::new(SimulatedBackend::with_timing(
            Duration::from_millis(20),
            Duration::from_secs(10),
        )),
        PlayerSettings {
            position_interval_ms: 0,
            ..PlayerSettings::default()
        },
    )
    .unwrap()
}

async fn send(client: &mut DuplexStream, message: Value) {
    let mut line = serde_json::to_vec(&message).unwrap();
    line.push(b'\n');
    client.write_all(&line).await.unwrap();
}

#[tokio::test]
async fn preload_play_stop_release_scenario() {
    let output = SharedBuffer::default();
    let host = host(&output);
    let (mut client, server) = tokio::io::duplex(4096);

    let out = output.clone();
    let driver = async move {
        send(
            &mut client,
            json!({"id": 1, "method": "player.preload", "uid": "p1", "args": {"url": "a.mp3"}}),
        )
        .await;
        assert_eq!(out.response(1).await["status"], "success");
        sleep(Duration::from_millis(100)).await;
        assert!(
            out.messages().iter().all(|m| m.get("method").is_none()),
            "preload must stay silent"
        );

        send(
            &mut client,
            json!({"id": 2, "method": "player.play", "uid": "p1", "args": {"url": "a.mp3"}}),
        )
        .await;
        let started = out.wait_for(|m| m["method"] == "player.onPlay").await;
        assert_eq!(started["uid"], "p1");
        assert_eq!(started["argument"], 10_000);

        send(
            &mut client,
            json!({"id": 3, "method": "player.stop", "uid": "p1", "args": {"completed": true}}),
        )
        .await;
        let stopped = out.wait_for(|m| m["method"] == "player.onStop").await;
        assert_eq!(stopped["argument"], true);

        send(&mut client, json!({"id": 4, "method": "player.release", "uid": "p1"})).await;
        send(&mut client, json!({"id": 5, "method": "player.duration", "uid": "p1"})).await;
        assert_eq!(out.response(5).await["value"], -1);
        drop(client);
    };

    let (result, ()) = tokio::join!(host.serve(BufReader::new(server)), driver);
    result.expect("bridge should shut down cleanly");

    assert_eq!(output.events("player.onPlay").len(), 1);
    assert_eq!(output.events("player.onStop").len(), 1);
    assert!(output.events("player.onError").is_empty());
}

#[tokio::test]
async fn superseded_play_reports_once() {
    let output = SharedBuffer::default();
    let host = host(&output);
    let (mut client, server) = tokio::io::duplex(4096);

    let out = output.clone();
    let driver = async move {
        send(
            &mut client,
            json!({"id": 1, "method": "player.play", "uid": "p1", "args": {"url": "one.mp3"}}),
        )
        .await;
        send(
            &mut client,
            json!({"id": 2, "method": "player.play", "uid": "p1", "args": {"url": "two.mp3"}}),
        )
        .await;
        out.wait_for(|m| m["method"] == "player.onPlay").await;
        sleep(Duration::from_millis(100)).await;
        drop(client);
    };

    let (result, ()) = tokio::join!(host.serve(BufReader::new(server)), driver);
    result.unwrap();
    assert_eq!(output.events("player.onPlay").len(), 1);
}

#[tokio::test]
async fn failures_are_reported_on_the_channel() {
    let output = SharedBuffer::default();
    let host = host(&output);
    let (mut client, server) = tokio::io::duplex(4096);

    let out = output.clone();
    let driver = async move {
        client.write_all(b"{\"id\": 7, \"method\": 3}\n").await.unwrap();
        let rejected = out.response(7).await;
        assert_eq!(rejected["status"], "error");
        assert_eq!(rejected["code"], "parse_error");

        send(
            &mut client,
            json!({"id": 8, "method": "player.play", "uid": "p2", "args": {"url": "fail://gone"}}),
        )
        .await;
        assert_eq!(out.response(8).await["status"], "success");
        let error = out.wait_for(|m| m["method"] == "player.onError").await;
        assert_eq!(error["uid"], "p2");
        assert_eq!(error["argument"]["code"], "datasource");

        send(
            &mut client,
            json!({"id": 9, "method": "player.seek", "uid": "p3", "args": {"position": 1.5}}),
        )
        .await;
        out.response(9).await;
        drop(client);
    };

    let (result, ()) = tokio::join!(host.serve(BufReader::new(server)), driver);
    result.unwrap();

    let errors = output.events("player.onError");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[1]["uid"], "p3");
    assert_eq!(errors[1]["argument"]["code"], "invalid_state");
}

#[tokio::test]
async fn oversized_seek_keeps_player_alive() {
    let output = SharedBuffer::default();
    let host = host(&output);
    let (mut client, server) = tokio::io::duplex(4096);

    let out = output.clone();
    let driver = async move {
        send(
            &mut client,
            json!({"id": 1, "method": "player.play", "uid": "p1", "args": {"url": "a.mp3"}}),
        )
        .await;
        out.wait_for(|m| m["method"] == "player.onPlay").await;

        send(
            &mut client,
            json!({"id": 2, "method": "player.seek", "uid": "p1", "args": {"position": 1e20}}),
        )
        .await;
        let position = out
            .wait_for(|m| m["method"] == "player.onCurrentPosition")
            .await;
        assert_eq!(position["argument"], 10_000);

        send(&mut client, json!({"id": 3, "method": "player.duration", "uid": "p1"})).await;
        assert_eq!(out.response(3).await["value"], 10_000);
        drop(client);
    };

    let (result, ()) = tokio::join!(host.serve(BufReader::new(server)), driver);
    result.unwrap();
    assert!(output.events("player.onError").is_empty());
}
