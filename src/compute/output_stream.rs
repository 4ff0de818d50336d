//! Stream of signed computation outputs.
//!
//! Push-based: the cluster sends each output as soon as it is signed and the
//! session program's relay loop consumes them. Works with `tokio::select!`.

use super::traits::{ComputeError, SignedOutput};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Receiving side of the output channel.
pub struct OutputStream {
    receiver: mpsc::UnboundedReceiver<SignedOutput>,
}

impl OutputStream {
    pub fn new() -> (Self, OutputSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, OutputSender { sender })
    }
}

impl Stream for OutputStream {
    type Item = SignedOutput;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Sending side of the output channel.
#[derive(Clone)]
pub struct OutputSender {
    sender: mpsc::UnboundedSender<SignedOutput>,
}

impl OutputSender {
    pub fn send(&self, output: SignedOutput) -> Result<(), ComputeError> {
        self.sender
            .send(output)
            .map_err(|_| ComputeError::Unavailable("output stream closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn signed(tag: u8) -> SignedOutput {
        SignedOutput {
            payload: vec![tag],
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn test_receives_in_order() {
        let (mut stream, sender) = OutputStream::new();
        for i in 0..5 {
            sender.send(signed(i)).unwrap();
        }
        for i in 0..5 {
            assert_eq!(stream.next().await.unwrap().payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn test_closes_when_sender_dropped() {
        let (mut stream, sender) = OutputStream::new();
        drop(sender);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_stream_dropped_fails() {
        let (stream, sender) = OutputStream::new();
        drop(stream);
        assert!(matches!(
            sender.send(signed(0)),
            Err(ComputeError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_with_tokio_select() {
        let (mut stream, sender) = OutputStream::new();

        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            sender.send(signed(42)).unwrap();
        });

        let result = tokio::select! {
            output = stream.next() => {
                assert_eq!(output.unwrap().payload, vec![42]);
                "received"
            }
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(1)) => "timeout",
        };
        assert_eq!(result, "received");
    }

    #[tokio::test]
    async fn test_concurrent_senders() {
        let (mut stream, sender) = OutputStream::new();

        let mut handles = vec![];
        for i in 0..10u8 {
            let sender = sender.clone();
            handles.push(tokio::spawn(async move {
                sender.send(signed(i)).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut received = vec![];
        for _ in 0..10 {
            received.push(stream.next().await.unwrap().payload[0]);
        }
        received.sort();
        assert_eq!(received, (0..10).collect::<Vec<u8>>());
    }
}
