use std::time::Duration;

use epochctl_core::{ConfigTree, RequestEnvelope, ResponseEnvelope};
use epochctl_sdk::{ConfigPayload, ControlClient, EpochKey, Error, Namespace, Operation, ResponseStatus, SdkConfig};
use serde_json::json;
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
	net::TcpListener,
	sync::mpsc,
};

/// Fake server: for each request line, forward it to the test and write back `replies`.
async fn fake_server(replies: Vec<String>) -> (String, mpsc::UnboundedReceiver<String>) {
	fake_server_with(replies, false).await
}

/// Like [`fake_server`]; with `hang_up` the connection is dropped after the first batch of replies.
async fn fake_server_with(replies: Vec<String>, hang_up: bool) -> (String, mpsc::UnboundedReceiver<String>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap().to_string();
	let (tx, rx) = mpsc::unbounded_channel();
	tokio::spawn(async move {
		let Ok((sock, _)) = listener.accept().await else { return };
		let (rd, mut wr) = sock.into_split();
		let mut lines = BufReader::new(rd).lines();
		while let Ok(Some(line)) = lines.next_line().await {
			let _ = tx.send(line);
			for r in &replies {
				if wr.write_all(r.as_bytes()).await.is_err() {
					return;
				}
			}
			if hang_up {
				return;
			}
		}
	});
	(addr, rx)
}

fn cfg(endpoint: String) -> SdkConfig {
	SdkConfig { endpoint, ..SdkConfig::default() }
}

fn params(v: serde_json::Value) -> ConfigPayload {
	ConfigPayload::new().with(Namespace::Params, ConfigTree::from_value(v).unwrap())
}

#[tokio::test]
async fn wait_replies_are_read_through_to_terminal() {
	let (addr, mut seen) = fake_server(vec![
		"{\"response\":1,\"messages\":[\"queued behind 2 requests\"]}\n".into(),
		"{\"response\":1}\n".into(),
		"{\"response\":0,\"messages\":[\"Enqueued config.\"]}\n".into(),
	])
	.await;
	let mut client = ControlClient::connect(cfg(addr), "root:1234").await.unwrap();
	let out = client.send_update("next", "very high", params(json!({"lr": 0.1}))).await.unwrap();
	assert!(out.accepted);
	assert_eq!(out.status, Some(ResponseStatus::Ok));
	assert_eq!(out.messages, vec!["queued behind 2 requests".to_string(), "Enqueued config.".to_string()]);

	let sent: RequestEnvelope = serde_json::from_str(&seen.recv().await.unwrap()).unwrap();
	assert_eq!(sent.credentials.unwrap().user, "root");
	assert_eq!(sent.container[&EpochKey::Next].priority, epochctl_sdk::Priority::VERY_HIGH);
}

#[tokio::test]
async fn advisory_warning_does_not_alter_what_is_sent() {
	let (addr, mut seen) = fake_server(vec!["{\"response\":0,\"messages\":[]}\n".into()]).await;
	let mut client = ControlClient::connect(cfg(addr), None::<&str>).await.unwrap();
	let out = client.send_update(3_u64, "normal", params(json!({"batch_size": 8}))).await.unwrap();
	assert_eq!(out.advisories, vec!["The following variables in epoch 3 are restricted: params->batch_size.".to_string()]);

	let sent: RequestEnvelope = serde_json::from_str(&seen.recv().await.unwrap()).unwrap();
	assert_eq!(sent.credentials, None);
	assert_eq!(sent.container[&EpochKey::Epoch(3)].config.params.get("batch_size"), Some(&json!(8)));
}

#[tokio::test]
async fn error_status_is_not_accepted() {
	let reply = serde_json::to_string(&ResponseEnvelope::error(vec!["Wrong credentials.".into()])).unwrap() + "\n";
	let (addr, _seen) = fake_server(vec![reply]).await;
	let mut client = ControlClient::connect(cfg(addr), "wrong").await.unwrap();
	let out = client.send_one_epoch_update(params(json!({"lr": 1}))).await.unwrap();
	assert!(!out.accepted);
	assert_eq!(out.messages, vec!["Wrong credentials.".to_string()]);
}

#[tokio::test]
async fn invalid_epoch_never_reaches_the_wire() {
	let (addr, mut seen) = fake_server(vec!["{\"response\":0}\n".into()]).await;
	let mut client = ControlClient::connect(cfg(addr), None::<&str>).await.unwrap();
	let err = client.send_update(-1_i64, "normal", params(json!({"lr": 1}))).await.unwrap_err();
	assert!(matches!(err, Error::Core(epochctl_core::Error::InvalidEpoch(_))));
	let err = client.send_update("someday", "normal", ConfigPayload::new()).await.unwrap_err();
	assert!(matches!(err, Error::Core(epochctl_core::Error::InvalidEpoch(_))));
	client.close().await.unwrap();
	assert!(seen.recv().await.is_none());
}

#[tokio::test]
async fn malformed_credentials_fail_before_connecting() {
	let bad = epochctl_core::CredentialInput::Sequence(vec![]);
	let err = ControlClient::connect(cfg("127.0.0.1:1".into()), bad).await.err().unwrap();
	assert!(matches!(err, Error::Core(epochctl_core::Error::MalformedCredential(_))));
}

#[tokio::test]
async fn batch_sends_one_envelope() {
	let (addr, mut seen) = fake_server(vec!["{\"response\":0,\"messages\":[\"Enqueued config.\"]}\n".into()]).await;
	let mut client = ControlClient::connect(cfg(addr), "root:1234").await.unwrap();

	assert!(matches!(client.add_step(1_u64, "update", "normal", ConfigPayload::new()), Err(Error::NoBatch)));
	let out = client.commit_batch().await.unwrap();
	assert!(!out.accepted && out.status.is_none());

	client.begin_batch();
	client.add_step(1_u64, "update", "normal", params(json!({"lr": 0.1}))).unwrap();
	client.add_step("next", Operation::OneEpochUpdate, "high", params(json!({"lr": 0.2}))).unwrap();
	client.add_step(1_u64, "update", "normal", params(json!({"lr": 0.3}))).unwrap();
	let out = client.commit_batch().await.unwrap();
	assert!(out.accepted);

	let sent: RequestEnvelope = serde_json::from_str(&seen.recv().await.unwrap()).unwrap();
	assert_eq!(sent.container.len(), 2);
	assert_eq!(sent.container[&EpochKey::Epoch(1)].config.params.get("lr"), Some(&json!(0.3)));
	assert_eq!(sent.container[&EpochKey::Next].operation, Operation::OneEpochUpdate);

	client.begin_batch();
	assert!(!client.commit_batch().await.unwrap().accepted);
}

#[tokio::test]
async fn close_before_terminal_is_disconnected() {
	let (addr, _seen) = fake_server_with(vec!["{\"response\":1}\n".into()], true).await;
	let mut client = ControlClient::connect(cfg(addr), None::<&str>).await.unwrap();
	let err = client.send_one_epoch_update(ConfigPayload::new()).await.unwrap_err();
	assert!(matches!(err, Error::Disconnected));
}

#[tokio::test]
async fn wait_alone_keeps_the_client_reading() {
	let (addr, _seen) = fake_server(vec!["{\"response\":1}\n".into()]).await;
	let mut client = ControlClient::connect(cfg(addr), None::<&str>).await.unwrap();
	let out = tokio::time::timeout(Duration::from_millis(300), client.send_one_epoch_update(ConfigPayload::new())).await;
	assert!(out.is_err());
}

#[tokio::test]
async fn response_timeout_surfaces_locally() {
	let (addr, _seen) = fake_server(vec![]).await;
	let mut client = ControlClient::connect(
		SdkConfig { response_timeout_ms: Some(100), ..cfg(addr) },
		None::<&str>,
	)
	.await
	.unwrap();
	let err = client.send_one_epoch_update(ConfigPayload::new()).await.unwrap_err();
	assert!(matches!(err, Error::Timeout));
}
