//! Messages exchanged with the host app over the local socket.
//!
//! Protobuf encoded, one message per length-prefixed frame.

/// A prompt from the host app
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatRequest {
    /// Echoed back on the response so the client can match replies
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub prompt: String,
}

/// The server's answer to one `ChatRequest`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatResponse {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(enumeration = "ResponseKind", tag = "3")]
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseKind {
    /// A chunk of a text reply still being generated
    Text = 0,
    /// Final message is an image URL
    Image = 1,
    /// The complete text reply
    End = 2,
    /// Final message is an error description
    Error = 3,
}

impl ResponseKind {
    /// Whether this response closes its request
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResponseKind::Text)
    }
}

impl ChatRequest {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }
}

impl ChatResponse {
    pub fn new(id: impl Into<String>, message: impl Into<String>, kind: ResponseKind) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            kind: kind as i32,
        }
    }

    /// Decoded kind; `None` for values this build does not know.
    pub fn response_kind(&self) -> Option<ResponseKind> {
        ResponseKind::try_from(self.kind).ok()
    }
}
