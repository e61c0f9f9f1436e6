//! Array and log transport tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use switchboard::transport::array::ArrayTransport;
use switchboard::transport::log::{LogSink, LogTransport};
use switchboard::{Message, Transport};

#[derive(Default)]
struct CapturingSink {
    lines: Mutex<Vec<String>>,
}

impl LogSink for CapturingSink {
    fn debug(&self, message: &dyn fmt::Display) {
        self.lines
            .lock()
            .expect("sink lock")
            .push(message.to_string());
    }
}

fn message(content: &str, to: &[&str]) -> Message {
    let mut message = Message::new();
    message
        .set_from("+15550000")
        .set_to(to)
        .set_content(content);
    message
}

#[tokio::test]
async fn array_records_each_send_in_order() {
    let sink = ArrayTransport::new();
    for content in ["one", "two", "three"] {
        let before = sink.len();
        let sent = sink
            .send(&message(content, &["+1A"]))
            .await
            .expect("never fails")
            .expect("always delivers");
        assert_eq!(sink.len(), before + 1);
        assert_eq!(sent.original_message(), &message(content, &["+1A"]));
    }

    let contents: Vec<String> = sink
        .messages()
        .iter()
        .map(|sent| sent.original_message().content().to_owned())
        .collect();
    assert_eq!(contents, ["one", "two", "three"]);
}

#[tokio::test]
async fn array_flush_returns_and_clears() {
    let sink = ArrayTransport::new();
    sink.send(&message("hi", &["+1A"])).await.expect("send");
    let flushed = sink.flush();
    assert_eq!(flushed.len(), 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn log_transport_renders_the_message_block() {
    let sink = Arc::new(CapturingSink::default());
    let transport = LogTransport::new(sink.clone());

    let sent = transport
        .send(&message("hello there", &["+1A", "+1B"]))
        .await
        .expect("never fails");
    assert!(sent.is_some());

    let lines = sink.lines.lock().expect("sink lock");
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines[0],
        "----- Sms Message -----\n\
         From: +15550000\n\
         To: [ +1A, +1B ]\n\
         Content: hello there\n\
         ----- Sms Message -----\n"
    );
    assert_eq!(transport.name(), "log");
}
