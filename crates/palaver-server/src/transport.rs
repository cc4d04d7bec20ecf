//! Axum WebSocket adapter.
//!
//! Maps `axum::extract::ws::Message` to and from router [`Frame`]s so the
//! router never depends on the WebSocket library directly.

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, future};

use crate::router::Frame;

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(data) => Self::Ping(data.to_vec()),
            Message::Pong(data) => Self::Pong(data.to_vec()),
            Message::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data.into()),
            Frame::Ping(data) => Self::Ping(data.into()),
            Frame::Pong(data) => Self::Pong(data.into()),
            Frame::Close => Self::Close(None),
        }
    }
}

/// Split an upgraded socket into a frame sink and a frame stream.
pub fn split(
    socket: WebSocket,
) -> (
    impl Sink<Frame, Error = axum::Error> + Send + Unpin + 'static,
    impl Stream<Item = Result<Frame, axum::Error>> + Send + Unpin + 'static,
) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    let stream = stream.map(|message| message.map(Frame::from));
    (sink, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_maps_both_ways() {
        let frame = Frame::from(Message::Text("hi".into()));
        assert_eq!(frame, Frame::Text("hi".into()));
        assert!(matches!(Message::from(frame), Message::Text(t) if t.as_str() == "hi"));
    }

    #[test]
    fn close_maps_both_ways() {
        assert_eq!(Frame::from(Message::Close(None)), Frame::Close);
        assert!(matches!(Message::from(Frame::Close), Message::Close(None)));
    }

    #[test]
    fn binary_and_ping_keep_payload() {
        assert_eq!(
            Frame::from(Message::Binary(vec![1, 2, 3].into())),
            Frame::Binary(vec![1, 2, 3])
        );
        assert!(matches!(Message::from(Frame::Ping(vec![9])), Message::Ping(p) if p[..] == [9u8]));
    }
}
