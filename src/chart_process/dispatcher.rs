//! A seekable cursor over a published timeline.
//!
//! The dispatcher keeps the index of the first event that has not happened yet. Seeking forward fires the events it
//! crosses in index order; seeking backward fires them again in reverse order with [`Direction::Backward`], which
//! listeners treat as "this has not happened after all".

use std::sync::Arc;

use gametime::TimeSpan;

use super::ChartHandle;
use crate::timeline::{Timeline, TimelineEvent};

/// The direction an event is crossed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The event happens.
    Forward,
    /// The event is undone.
    Backward,
}

/// A callback invoked for every crossed event.
pub type Listener = Box<dyn FnMut(&TimelineEvent, Direction) + Send>;

/// Replays a timeline published through a [`ChartHandle`].
///
/// Seeks on one dispatcher must be serialized by the caller. When the handle publishes a new timeline, the next seek
/// resets the cursor to before the first event and continues on the new timeline.
pub struct EventDispatcher {
    handle: Arc<ChartHandle>,
    timeline: Arc<Timeline>,
    generation: u64,
    cursor: usize,
    current: Option<TimeSpan>,
    offset: TimeSpan,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("generation", &self.generation)
            .field("cursor", &self.cursor)
            .field("current", &self.current)
            .field("offset", &self.offset)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn notify(listeners: &mut [Listener], event: &TimelineEvent, direction: Direction) {
    for listener in listeners {
        listener(event, direction);
    }
}

impl EventDispatcher {
    /// Creates a dispatcher before the first event of the current timeline of `handle`.
    #[must_use]
    pub fn new(handle: Arc<ChartHandle>) -> Self {
        let (timeline, generation) = handle.load();
        Self {
            handle,
            timeline,
            generation,
            cursor: 0,
            current: None,
            offset: TimeSpan::ZERO,
            listeners: Vec::new(),
        }
    }

    /// Makes every seek look `offset` ahead of the requested time. A look-ahead dispatcher uses this to spawn visuals
    /// before their events happen.
    #[must_use]
    pub const fn with_offset(mut self, offset: TimeSpan) -> Self {
        self.offset = offset;
        self
    }

    /// Registers a listener. Listeners are invoked in registration order.
    pub fn add_listener(&mut self, listener: impl FnMut(&TimelineEvent, Direction) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Removes every listener.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// The timeline being replayed.
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// The generation of the timeline being replayed.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The index of the first event that has not happened.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// The time of the last seek including the offset, or `None` before the first event.
    #[must_use]
    pub const fn current_time(&self) -> Option<TimeSpan> {
        self.current
    }

    /// Returns whether every event has happened.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.timeline.events().len()
    }

    /// Switches to the latest published timeline if there is one, returning whether it did.
    pub fn resync(&mut self) -> bool {
        if self.handle.generation() == self.generation {
            return false;
        }
        let (timeline, generation) = self.handle.load();
        self.timeline = timeline;
        self.generation = generation;
        self.cursor = 0;
        self.current = None;
        true
    }

    /// Moves to `time`, returning the number of events crossed.
    ///
    /// Forward, every event at or before the target happens. Backward, every event at or after the target is undone.
    /// With `fire` off, the cursor jumps there by binary search and no listener is invoked.
    pub fn seek(&mut self, time: TimeSpan, fire: bool) -> usize {
        self.resync();
        let target = time.checked_add(self.offset).unwrap_or(if self.offset < TimeSpan::ZERO {
            TimeSpan::MIN
        } else {
            TimeSpan::MAX
        });
        let forward = match self.current {
            None => true,
            Some(current) if target > current => true,
            Some(current) if target < current => false,
            Some(_) => return 0,
        };
        self.current = Some(target);
        if forward {
            self.advance_while(|event| event.time <= target, fire)
        } else {
            self.retreat_while(|event| event.time >= target, fire)
        }
    }

    /// Moves past the last event.
    pub fn seek_to_end(&mut self, fire: bool) -> usize {
        self.resync();
        let crossed = self.advance_while(|_| true, fire);
        let end = self.timeline.end_time();
        self.current = Some(self.current.map_or(end, |current| current.max(end)));
        crossed
    }

    /// Moves back to before the first event, undoing everything that happened.
    pub fn rewind(&mut self, fire: bool) -> usize {
        self.resync();
        let crossed = self.retreat_while(|_| true, fire);
        self.current = None;
        crossed
    }

    fn advance_while(&mut self, happens: impl Fn(&TimelineEvent) -> bool, fire: bool) -> usize {
        let events = self.timeline.events();
        let start = self.cursor;
        if !fire {
            let skipped = events.get(start..).unwrap_or_default();
            self.cursor = start + skipped.partition_point(|event| happens(event));
            return self.cursor - start;
        }
        for event in events.get(start..).unwrap_or_default() {
            if !happens(event) {
                break;
            }
            notify(&mut self.listeners, event, Direction::Forward);
            self.cursor += 1;
        }
        self.cursor - start
    }

    fn retreat_while(&mut self, undone: impl Fn(&TimelineEvent) -> bool, fire: bool) -> usize {
        let events = self.timeline.events();
        let start = self.cursor.min(events.len());
        let happened = events.get(..start).unwrap_or_default();
        if !fire {
            self.cursor = happened.partition_point(|event| !undone(event));
            return start - self.cursor;
        }
        self.cursor = start;
        for event in happened.iter().rev() {
            if !undone(event) {
                break;
            }
            notify(&mut self.listeners, event, Direction::Backward);
            self.cursor -= 1;
        }
        start - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        time::span_from_secs,
        timeline::{ChartHeader, EventKind, ResourceTable},
    };

    fn timeline(seconds: &[f64]) -> Timeline {
        let events = seconds
            .iter()
            .enumerate()
            .map(|(index, &secs)| {
                TimelineEvent::new(span_from_secs(secs), EventKind::Note, 11, index as i64)
                    .with_order(index as u64)
            })
            .collect();
        Timeline::from_parts(ChartHeader::default(), ResourceTable::default(), events, vec![])
    }

    fn recorder(dispatcher: &mut EventDispatcher) -> Arc<Mutex<Vec<(i64, Direction)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        dispatcher.add_listener(move |event, direction| {
            sink.lock().unwrap().push((event.payload, direction));
        });
        log
    }

    #[test]
    fn forward_and_backward() {
        let handle = Arc::new(ChartHandle::new(timeline(&[0.0, 1.0, 2.0])));
        let mut dispatcher = EventDispatcher::new(handle);
        let log = recorder(&mut dispatcher);

        assert_eq!(dispatcher.seek(span_from_secs(1.0), true), 2);
        assert_eq!(dispatcher.seek(span_from_secs(1.0), true), 0);
        assert_eq!(dispatcher.seek(span_from_secs(0.5), true), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (0, Direction::Forward),
                (1, Direction::Forward),
                (1, Direction::Backward),
            ]
        );
        assert_eq!(dispatcher.cursor(), 1);
    }

    #[test]
    fn silent_jump() {
        let handle = Arc::new(ChartHandle::new(timeline(&[0.0, 1.0, 2.0, 3.0])));
        let mut dispatcher = EventDispatcher::new(handle);
        let log = recorder(&mut dispatcher);
        assert_eq!(dispatcher.seek(span_from_secs(2.5), false), 3);
        assert_eq!(dispatcher.seek(span_from_secs(1.0), false), 2);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(dispatcher.cursor(), 1);
        assert_eq!(dispatcher.seek_to_end(true), 3);
        assert!(dispatcher.is_at_end());
    }

    #[test]
    fn offset_looks_ahead() {
        let handle = Arc::new(ChartHandle::new(timeline(&[1.0])));
        let mut dispatcher = EventDispatcher::new(handle).with_offset(span_from_secs(0.5));
        assert_eq!(dispatcher.seek(span_from_secs(0.5), true), 1);
        assert_eq!(dispatcher.current_time(), Some(span_from_secs(1.0)));
    }

    #[test]
    fn extreme_offsets_saturate() {
        let handle = Arc::new(ChartHandle::new(timeline(&[0.0, 1.0])));
        let mut ahead = EventDispatcher::new(Arc::clone(&handle)).with_offset(TimeSpan::MAX);
        assert_eq!(ahead.seek(span_from_secs(1.0), true), 2);
        assert_eq!(ahead.current_time(), Some(TimeSpan::MAX));

        let mut behind = EventDispatcher::new(handle).with_offset(TimeSpan::MIN);
        assert_eq!(behind.seek(TimeSpan::ZERO - span_from_secs(1.0), true), 0);
        assert_eq!(behind.current_time(), Some(TimeSpan::MIN));
    }

    #[test]
    fn publish_resets_the_cursor() {
        let handle = Arc::new(ChartHandle::new(timeline(&[0.0, 1.0])));
        let mut dispatcher = EventDispatcher::new(Arc::clone(&handle));
        dispatcher.seek(span_from_secs(5.0), true);
        assert!(dispatcher.is_at_end());

        handle.publish(timeline(&[0.0, 1.0, 2.0]));
        assert_eq!(dispatcher.seek(span_from_secs(5.0), true), 3);
        assert_eq!(dispatcher.generation(), 1);
    }
}
