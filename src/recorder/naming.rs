//! Loop counter and output file naming
//!
//! Generates the `Loop_<id>_<HHMMSS>_<DDMMYYYY>` stem shared by a
//! segment's video and audio files. The counter is owned by the
//! controller instance, not process-wide, and survives capture
//! open/close cycles.

use chrono::{DateTime, Local};

/// Monotonic per-controller loop counter.
#[derive(Debug, Clone, Default)]
pub struct LoopNamer {
    counter: u64,
}

impl LoopNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last id handed out (0 if none yet).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Claim the next loop id and stamp it with the current local time.
    ///
    /// Both output names derived from the returned [`LoopName`] share the
    /// id and the timestamp; the counter moves by exactly one per call.
    pub fn next(&mut self) -> LoopName {
        self.counter += 1;
        LoopName::stamped(self.counter, Local::now())
    }

    /// Return the most recently claimed id to the counter.
    ///
    /// Only valid when the corresponding segment was never opened (writer
    /// open failed before any file was created); keeps the id sequence
    /// gap-free.
    pub fn rewind(&mut self) {
        self.counter = self.counter.saturating_sub(1);
    }

    /// Reset the counter to 0. The controller only permits this while no
    /// segment is active; operator confirmation is the embedder's job.
    /// Returns the previous value.
    pub fn reset(&mut self) -> u64 {
        std::mem::take(&mut self.counter)
    }
}

/// The stem and id for one segment's output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopName {
    id: u64,
    stem: String,
}

impl LoopName {
    /// Build a name from an id and an explicit timestamp.
    pub fn stamped(id: u64, at: DateTime<Local>) -> Self {
        let stem = format!(
            "Loop_{}_{}_{}",
            id,
            at.format("%H%M%S"),
            at.format("%d%m%Y")
        );
        Self { id, stem }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn video_file(&self) -> String {
        format!("{}.mp4", self.stem)
    }

    pub fn audio_file(&self) -> String {
        format!("{}.wav", self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn name_format_is_exact() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 9).unwrap();
        let name = LoopName::stamped(7, at);

        assert_eq!(name.stem(), "Loop_7_140509_09032024");
        assert_eq!(name.video_file(), "Loop_7_140509_09032024.mp4");
        assert_eq!(name.audio_file(), "Loop_7_140509_09032024.wav");
    }

    #[test]
    fn video_and_audio_share_id_and_stamp() {
        let mut namer = LoopNamer::new();
        let name = namer.next();

        let video = name.video_file();
        let audio = name.audio_file();
        assert_eq!(
            video.trim_end_matches(".mp4"),
            audio.trim_end_matches(".wav")
        );
    }

    #[test]
    fn counter_increments_by_exactly_one() {
        let mut namer = LoopNamer::new();
        assert_eq!(namer.next().id(), 1);
        assert_eq!(namer.next().id(), 2);
        assert_eq!(namer.next().id(), 3);
        assert_eq!(namer.counter(), 3);
    }

    #[test]
    fn rewind_returns_an_unused_id() {
        let mut namer = LoopNamer::new();
        namer.next();
        namer.next();
        namer.rewind();
        assert_eq!(namer.next().id(), 2);
    }

    #[test]
    fn reset_reports_previous_value() {
        let mut namer = LoopNamer::new();
        namer.next();
        namer.next();
        assert_eq!(namer.reset(), 2);
        assert_eq!(namer.next().id(), 1);
    }
}
