//! The physical audio channel behind the alarm.
//!
//! [`AlarmPlayer`] is the narrow interface the controller renders playback
//! commands into. Exactly one session (the active one) ever drives a
//! player; everything above this trait is playback *policy*, everything
//! below it is platform audio and out of scope.

/// One audio channel: load a sound file, position it, bound its playback,
/// and start/stop it.
///
/// Implementations must tolerate redundant commands (`stop` while stopped,
/// `mute` while muted); the controller re-renders its full desired state
/// rather than diffing.
pub trait AlarmPlayer: Send {
    /// Load a sound file by name. Does not start playback.
    fn load(&mut self, file: &str);

    /// Move the playback position, in seconds.
    fn seek(&mut self, position: f64);

    /// Bound looped playback to the given number of seconds.
    fn set_timeout(&mut self, seconds: f64);

    /// Switch between play-once and looped playback.
    fn play_once(&mut self, once: bool);

    /// Start playback of the loaded file.
    fn play(&mut self);

    /// Silence output without stopping playback.
    fn mute(&mut self);

    /// Restore output.
    fn unmute(&mut self);

    /// Stop playback.
    fn stop(&mut self);

    /// Current playback position in seconds.
    fn seek_position(&self) -> f64;

    /// Seconds of playback remaining before the timeout elapses; `0.0` when
    /// stopped.
    fn timeout_remaining(&self) -> f64;

    /// Whether this platform can produce sound at all.
    fn is_supported(&self) -> bool;
}

/// Player for platforms without audio support. Every command is a no-op.
#[derive(Debug, Default)]
pub struct SilentPlayer;

impl AlarmPlayer for SilentPlayer {
    fn load(&mut self, _file: &str) {}
    fn seek(&mut self, _position: f64) {}
    fn set_timeout(&mut self, _seconds: f64) {}
    fn play_once(&mut self, _once: bool) {}
    fn play(&mut self) {}
    fn mute(&mut self) {}
    fn unmute(&mut self) {}
    fn stop(&mut self) {}

    fn seek_position(&self) -> f64 {
        0.0
    }

    fn timeout_remaining(&self) -> f64 {
        0.0
    }

    fn is_supported(&self) -> bool {
        false
    }
}

/// Commands observed by a [`RecordingPlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Load(String),
    Seek(f64),
    SetTimeout(f64),
    PlayOnce(bool),
    Play,
    Mute,
    Unmute,
    Stop,
}

/// Nominal clip length reported by a [`RecordingPlayer`] in play-once mode.
pub const RECORDING_CLIP_SECS: f64 = 2.0;

/// Test and simulator player that records the command stream and models
/// the seek/timeout arithmetic without producing sound.
#[derive(Debug)]
pub struct RecordingPlayer {
    commands: Vec<PlayerCommand>,
    file: Option<String>,
    playing: bool,
    muted: bool,
    once: bool,
    position: f64,
    timeout: f64,
}

impl Default for RecordingPlayer {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            file: None,
            playing: false,
            muted: false,
            once: false,
            position: 0.0,
            timeout: 0.0,
        }
    }
}

impl RecordingPlayer {
    /// Create a stopped, empty player.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command applied so far, in order.
    pub fn commands(&self) -> &[PlayerCommand] {
        &self.commands
    }

    /// Drain the recorded commands (for per-phase assertions).
    pub fn take_commands(&mut self) -> Vec<PlayerCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Whether playback is currently running.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether output is currently muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// The currently loaded file, if any.
    pub fn loaded_file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}

impl AlarmPlayer for RecordingPlayer {
    fn load(&mut self, file: &str) {
        self.commands.push(PlayerCommand::Load(file.to_string()));
        self.file = Some(file.to_string());
    }

    fn seek(&mut self, position: f64) {
        self.commands.push(PlayerCommand::Seek(position));
        self.position = position;
    }

    fn set_timeout(&mut self, seconds: f64) {
        self.commands.push(PlayerCommand::SetTimeout(seconds));
        self.timeout = seconds;
    }

    fn play_once(&mut self, once: bool) {
        self.commands.push(PlayerCommand::PlayOnce(once));
        self.once = once;
    }

    fn play(&mut self) {
        self.commands.push(PlayerCommand::Play);
        self.playing = true;
    }

    fn mute(&mut self) {
        self.commands.push(PlayerCommand::Mute);
        self.muted = true;
    }

    fn unmute(&mut self) {
        self.commands.push(PlayerCommand::Unmute);
        self.muted = false;
    }

    fn stop(&mut self) {
        self.commands.push(PlayerCommand::Stop);
        self.playing = false;
        self.position = 0.0;
    }

    fn seek_position(&self) -> f64 {
        self.position
    }

    fn timeout_remaining(&self) -> f64 {
        if !self.playing {
            0.0
        } else if self.once {
            RECORDING_CLIP_SECS
        } else {
            self.timeout
        }
    }

    fn is_supported(&self) -> bool {
        true
    }
}
