//! Synthesised cues played through the default output device.

use std::time::Duration;

use rodio::{
    source::{SineWave, TriangleWave},
    OutputStream, OutputStreamBuilder, Sink, Source,
};

use crate::cue::{Cue, CuePlayer};

const ATTACK: Duration = Duration::from_millis(5);

pub struct RodioPlayer {
    stream: OutputStream,
}

impl std::fmt::Debug for RodioPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioPlayer").finish_non_exhaustive()
    }
}

impl RodioPlayer {
    /// Open the default output stream.
    ///
    /// # Errors
    /// When there is no usable output device.
    pub fn open() -> Result<Self, rodio::StreamError> {
        let mut stream = OutputStreamBuilder::open_default_stream()?;
        stream.log_on_drop(false);
        Ok(Self { stream })
    }

    fn submit<S>(&self, cue: Cue, volume: f32, source: S)
    where
        S: Source + Send + 'static,
    {
        log::debug!("playing {cue} cue at volume {volume}");
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);
        sink.append(source);
        // keep playing after the sink handle goes away
        sink.detach();
    }
}

impl CuePlayer for RodioPlayer {
    // rising two-tone ping
    fn play_normal(&mut self, volume: f32) {
        let base = SineWave::new(660.0).take_duration(Duration::from_millis(350));
        let overtone = SineWave::new(1320.0)
            .take_duration(Duration::from_millis(180))
            .amplify(0.35);
        let source = base.mix(overtone).fade_in(ATTACK);
        self.submit(Cue::Normal, volume, source);
    }

    // two short beeps
    fn play_warning(&mut self, volume: f32) {
        let first = SineWave::new(520.0).take_duration(Duration::from_millis(220));
        let second = SineWave::new(780.0)
            .take_duration(Duration::from_millis(200))
            .amplify(0.85)
            .delay(Duration::from_millis(220));
        let source = first.mix(second).fade_in(ATTACK);
        self.submit(Cue::Warning, volume, source);
    }

    fn play_final(&mut self, volume: f32) {
        let source = TriangleWave::new(880.0)
            .take_duration(Duration::from_millis(600))
            .fade_in(Duration::from_millis(10));
        self.submit(Cue::Final, volume, source);
    }
}
