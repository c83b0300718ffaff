use crate::protocol::ServerMessage;

/// Destination for outbound messages
///
/// Implemented by the session manager. Producers (the feature extractor and
/// the demo sequencer) only see this trait, never the connection itself.
pub trait MessageSink: Send + Sync {
    /// Whether a client is currently connected
    fn has_session(&self) -> bool;

    /// Queue a message for the active client. Never fails: with no client,
    /// or a client that is already gone, the message is dropped.
    fn send(&self, message: ServerMessage);

    /// Evaluate `gate` and queue `message` only if it returned true, as one
    /// step with respect to every other send. The gate runs whether or not a
    /// client is connected; its verdict is returned.
    ///
    /// The default is not atomic. Sinks shared between producers override it.
    fn send_if(&self, message: ServerMessage, gate: &dyn Fn() -> bool) -> bool {
        let pass = gate();
        if pass {
            self.send(message);
        }
        pass
    }
}
