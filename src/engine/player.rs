//! Source player node
//!
//! Plays one scheduled region of the attached source. Its sample time counts
//! frames rendered while playing since the last `stop()`, in source frames;
//! pausing keeps it, stopping zeroes it. After the region is exhausted the
//! player keeps running and outputs silence, and the sample time keeps
//! counting, so a position derived from it runs past the end and the
//! transport can detect end-of-file.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::engine::buffer::AudioBuffer;
use crate::engine::transport::ControlEvent;

/// A segment of the source queued for playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRegion {
    pub start_frame: u64,
    pub frame_count: u64,
    /// Identifies this schedule in its completion notification
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Player {
    audio: Option<Arc<AudioBuffer>>,
    region: Option<ScheduledRegion>,
    /// Frames of `region` already rendered
    cursor: u64,
    completed: bool,
    playing: bool,
    sample_time: u64,
    next_generation: u64,
    completion: Option<Sender<ControlEvent>>,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where scheduling completions are delivered
    pub fn set_completion_sender(&mut self, sender: Sender<ControlEvent>) {
        self.completion = Some(sender);
    }

    /// Attach decoded source audio, stopping any current playback
    pub fn attach(&mut self, audio: Arc<AudioBuffer>) {
        self.stop();
        self.audio = Some(audio);
    }

    pub fn detach(&mut self) {
        self.stop();
        self.audio = None;
    }

    pub fn has_source(&self) -> bool {
        self.audio.is_some()
    }

    /// Queue `frame_count` frames starting at `start_frame`
    ///
    /// Replaces any earlier region; the earlier region's completion will never
    /// fire. Returns the generation of the new region.
    pub fn schedule_segment(&mut self, start_frame: u64, frame_count: u64) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.region = Some(ScheduledRegion {
            start_frame,
            frame_count,
            generation,
        });
        self.cursor = 0;
        self.completed = false;
        generation
    }

    pub fn scheduled_region(&self) -> Option<ScheduledRegion> {
        self.region
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Stop playback, drop the scheduled region and zero the sample time
    pub fn stop(&mut self) {
        self.playing = false;
        self.region = None;
        self.cursor = 0;
        self.completed = false;
        self.sample_time = 0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Frames rendered while playing since the last stop
    pub fn sample_time(&self) -> u64 {
        self.sample_time
    }

    /// Fill `out` with the next frames of the scheduled region
    pub fn render(&mut self, out: &mut AudioBuffer) {
        out.silence();
        if !self.playing {
            return;
        }
        let frames = out.len() as u64;

        if let (Some(audio), Some(region)) = (&self.audio, self.region) {
            let remaining = region.frame_count.saturating_sub(self.cursor);
            let count = remaining.min(frames);
            if count > 0 {
                let src_start = region.start_frame + self.cursor;
                out.copy_frames_from(audio, src_start as usize, 0, count as usize);
                self.cursor += count;
            }
            if self.cursor >= region.frame_count && !self.completed {
                self.completed = true;
                if let Some(sender) = &self.completion {
                    // receiver gone means the session is shutting down
                    let _ = sender.try_send(ControlEvent::ScheduleCompleted {
                        generation: region.generation,
                    });
                }
            }
        }

        self.sample_time += frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;

    fn ramp(len: usize) -> Arc<AudioBuffer> {
        let mut buffer = AudioBuffer::new(len, ChannelLayout::Mono, 1000);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }
        Arc::new(buffer)
    }

    #[test]
    fn test_paused_player_outputs_silence_and_keeps_time() {
        let mut player = Player::new();
        player.attach(ramp(100));
        player.schedule_segment(0, 100);

        let mut out = AudioBuffer::new(10, ChannelLayout::Mono, 1000);
        player.render(&mut out);
        assert_eq!(player.sample_time(), 0);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_plays_segment_from_offset() {
        let mut player = Player::new();
        player.attach(ramp(100));
        player.schedule_segment(40, 60);
        player.play();

        let mut out = AudioBuffer::new(10, ChannelLayout::Mono, 1000);
        player.render(&mut out);
        assert_eq!(out.channel(0)[0], 40.0);
        assert_eq!(out.channel(0)[9], 49.0);
        assert_eq!(player.sample_time(), 10);
    }

    #[test]
    fn test_completion_fires_once_with_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut player = Player::new();
        player.set_completion_sender(tx);
        player.attach(ramp(20));
        let generation = player.schedule_segment(5, 15);
        player.play();

        let mut out = AudioBuffer::new(10, ChannelLayout::Mono, 1000);
        player.render(&mut out);
        assert!(rx.try_recv().is_err());
        player.render(&mut out);
        // past the end: tail is silent, time keeps counting
        assert_eq!(out.channel(0)[4], 19.0);
        assert_eq!(out.channel(0)[5], 0.0);
        player.render(&mut out);

        assert_eq!(
            rx.try_recv().unwrap(),
            ControlEvent::ScheduleCompleted { generation }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(player.sample_time(), 30);
    }

    #[test]
    fn test_reschedule_bumps_generation() {
        let mut player = Player::new();
        player.attach(ramp(20));
        let first = player.schedule_segment(0, 20);
        let second = player.schedule_segment(10, 10);
        assert!(second > first);
        assert_eq!(player.scheduled_region().unwrap().start_frame, 10);
    }

    #[test]
    fn test_stop_resets_sample_time() {
        let mut player = Player::new();
        player.attach(ramp(100));
        player.schedule_segment(0, 100);
        player.play();
        let mut out = AudioBuffer::new(25, ChannelLayout::Mono, 1000);
        player.render(&mut out);
        player.pause();
        assert_eq!(player.sample_time(), 25);

        player.stop();
        assert_eq!(player.sample_time(), 0);
        assert!(player.scheduled_region().is_none());
    }
}
