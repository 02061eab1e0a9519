//! Newline-delimited JSON writer shared by responses and player events.

use std::io::Write;
use std::thread;

use cadence_player::{EventSink, TaggedEvent};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::EventMessage;
use crate::BridgeError;

#[derive(Debug)]
enum Outgoing {
    Line(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Queues whole lines for a dedicated writer thread that owns the output.
///
/// Callers never touch the underlying writer, so a host that stops reading cannot stall
/// the player tasks emitting events. Clones share the queue; lines keep the order in
/// which they were queued and never interleave.
#[derive(Debug, Clone)]
pub struct JsonLineWriter {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl JsonLineWriter {
    pub fn spawn<W: Write + Send + 'static>(writer: W) -> Result<Self, BridgeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("cadence-writer".into())
            .spawn(move || write_lines(writer, rx))?;
        Ok(Self { tx })
    }

    pub fn write_message<T: Serialize>(&self, message: &T) -> Result<(), BridgeError> {
        let mut line = serde_json::to_vec(message).map_err(BridgeError::Encode)?;
        line.push(b'\n');
        self.tx
            .send(Outgoing::Line(line))
            .map_err(|_| BridgeError::WriterClosed)
    }

    /// Resolves once every line queued before it has been written and flushed.
    pub async fn flush(&self) -> Result<(), BridgeError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outgoing::Flush(ack))
            .map_err(|_| BridgeError::WriterClosed)?;
        done.await.map_err(|_| BridgeError::WriterClosed)
    }
}

fn write_lines<W: Write>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = rx.blocking_recv() {
        let written = match outgoing {
            Outgoing::Line(line) => writer.write_all(&line).and_then(|()| writer.flush()),
            Outgoing::Flush(ack) => {
                let flushed = writer.flush();
                let _ = ack.send(());
                flushed
            }
        };
        if let Err(err) = written {
            tracing::error!(%err, "channel output failed, dropping further messages");
            return;
        }
    }
}

impl EventSink for JsonLineWriter {
    fn emit(&self, event: TaggedEvent) {
        let message = EventMessage::from(&event);
        if let Err(err) = self.write_message(&message) {
            tracing::warn!(uid = %event.uid, method = %message.method, %err, "failed to deliver event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use cadence_player::PlayerEvent;

    /// Holds every write until `open` is set, like a host that stopped reading.
    #[derive(Clone, Default)]
    struct Buffer {
        bytes: Arc<Mutex<Vec<u8>>>,
        open: Arc<AtomicBool>,
    }

    impl Buffer {
        fn opened() -> Self {
            let buffer = Self::default();
            buffer.open.store(true, Ordering::SeqCst);
            buffer
        }

        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.bytes.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            self.bytes.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_are_written_one_per_line() {
        let buffer = Buffer::opened();
        let writer = JsonLineWriter::spawn(buffer.clone()).unwrap();
        writer.emit(TaggedEvent {
            uid: "p1".into(),
            event: PlayerEvent::Paused,
        });
        writer.emit(TaggedEvent {
            uid: "p2".into(),
            event: PlayerEvent::Stopped { completed: false },
        });
        writer.flush().await.unwrap();

        assert_eq!(
            buffer.lines(),
            vec![
                r#"{"method":"player.onPause","uid":"p1","argument":null}"#,
                r#"{"method":"player.onStop","uid":"p2","argument":false}"#,
            ]
        );
    }

    #[tokio::test]
    async fn stalled_output_does_not_block_emitters() {
        let buffer = Buffer::default();
        let writer = JsonLineWriter::spawn(buffer.clone()).unwrap();

        for _ in 0..3 {
            writer.emit(TaggedEvent {
                uid: "p1".into(),
                event: PlayerEvent::Paused,
            });
        }
        assert!(buffer.lines().is_empty());

        buffer.open.store(true, Ordering::SeqCst);
        writer.flush().await.unwrap();
        assert_eq!(buffer.lines().len(), 3);
    }
}
