//! Inbound command handling

use crate::demo::DemoSequencer;
use octopid_core::{AudioCommand, Command, ControlState, DemoCommand, MessageSink, Mood, ServerMessage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies validated commands from the active session
///
/// Any command other than a demo command first preempts a running demo and
/// waits for its neutral finalizer, so the demo can never overwrite the
/// manual command that follows.
pub struct CommandInterpreter {
    sink: Arc<dyn MessageSink>,
    control: Arc<ControlState>,
    demo: Arc<DemoSequencer>,
}

impl CommandInterpreter {
    pub fn new(sink: Arc<dyn MessageSink>, control: Arc<ControlState>, demo: Arc<DemoSequencer>) -> Self {
        Self { sink, control, demo }
    }

    pub fn demo(&self) -> &Arc<DemoSequencer> {
        &self.demo
    }

    /// Decode one text frame and dispatch it. Invalid frames are logged and
    /// dropped; one that names a type other than `demo` still preempts a
    /// running demo, like any other non-demo message.
    pub async fn handle_text(&self, text: &str) -> Option<Command> {
        match Command::decode(text) {
            Ok(command) => {
                debug!("Received command: {}", command);
                self.dispatch(command).await;
                Some(command)
            }
            Err(e) => {
                warn!("Ignoring invalid message: {}", e);
                if e.preempts_demo() {
                    self.demo.preempt().await;
                }
                None
            }
        }
    }

    pub async fn dispatch(&self, command: Command) {
        if !command.is_demo() {
            self.demo.preempt().await;
        }

        match command {
            Command::SetMood(mood) => self.set_mood(mood),
            Command::AudioToggle(AudioCommand::On) => self.audio_on(),
            Command::AudioToggle(AudioCommand::Off) => self.audio_off(),
            Command::DemoControl(DemoCommand::Start) => {
                self.demo.start().await;
            }
            Command::DemoControl(DemoCommand::Stop) => {
                self.demo.stop().await;
            }
        }
    }

    fn set_mood(&self, mood: Mood) {
        info!("Mood set to {}", mood);
        self.sink.send(ServerMessage::mood(mood));
    }

    fn audio_on(&self) {
        if self.control.is_capture_faulted() {
            warn!("Audio capture has failed, ignoring audio on until restart");
            return;
        }
        if self.control.enable_audio() {
            info!("Audio reactivity enabled");
        }
    }

    /// The flag flips under the sink's lock, so no level tick can be queued
    /// after the reset.
    fn audio_off(&self) {
        let control = &self.control;
        if self.sink.send_if(ServerMessage::audio_reset(), &|| control.disable_audio()) {
            info!("Audio reactivity disabled");
        }
    }
}
