use embassy_time::Instant;
use log::debug;

use super::{Progress, batch_outputs};
use crate::reading::{Input, OutputKind};
use crate::router::Router;

/// Reads one sensor per step until every configured sensor was shown once.
///
/// The sensor count is captured when the cycle starts. The cycle is finished
/// when the cursor wraps back to the index it started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorCycle {
    count: usize,
    cursor: usize,
    start: usize,
}

impl SensorCycle {
    pub fn new(router: &Router) -> Self {
        Self::starting_at(router, 0)
    }

    /// A cycle beginning at `start` (taken modulo the sensor count).
    pub fn starting_at(router: &Router, start: usize) -> Self {
        let count = router.sensors().count();
        let start = if count == 0 { 0 } else { start % count };
        Self {
            count,
            cursor: start,
            start,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn step(&mut self, router: &mut Router, outputs: &[OutputKind], now: Instant) -> Progress {
        if self.count == 0 {
            return Progress::Finished;
        }

        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.count;

        match router.sensors().index_to_id(index) {
            Some(id) => {
                router.transfer(Input::Sensor(id), outputs, now);
            }
            None => debug!("No sensor at index {}, skipped", index),
        }

        if self.cursor == self.start {
            Progress::Finished
        } else {
            Progress::NotFinished
        }
    }
}

/// Read every sensor in one call. Paged outputs are left out.
pub fn read_all_sensors(router: &mut Router, outputs: &[OutputKind], now: Instant) -> Progress {
    let batch = batch_outputs(router, outputs);
    if batch.is_empty() {
        return Progress::Finished;
    }

    let count = router.sensors().count();
    for index in 0..count {
        if let Some(id) = router.sensors().index_to_id(index) {
            router.transfer(Input::Sensor(id), &batch, now);
        }
    }
    Progress::Finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GAS, HUMIDITY, PRESSURE, SensorId, TEMPERATURE};
    use crate::reading::Reading;
    use crate::sensors::SensorBank;
    use crate::testing::{FixedValue, RecordingSink};

    const IDS: [SensorId; 4] = [TEMPERATURE, HUMIDITY, PRESSURE, GAS];

    fn router(console: &RecordingSink) -> Router {
        let mut sensors = SensorBank::new();
        sensors.bind_value(TEMPERATURE, FixedValue::new(20.0)).unwrap();
        sensors.bind_value(HUMIDITY, FixedValue::new(40.0)).unwrap();
        sensors.bind_value(PRESSURE, FixedValue::new(1000.0)).unwrap();
        sensors.bind_value(GAS, FixedValue::new(400.0)).unwrap();
        Router::new()
            .with_sensors(sensors)
            .with_sink(OutputKind::Console, console.clone())
    }

    fn visited(console: &RecordingSink) -> Vec<SensorId> {
        console
            .readings()
            .iter()
            .filter_map(|reading| match reading {
                Reading::Sensor { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_finished_exactly_when_cursor_wraps() {
        for start in 0..IDS.len() {
            let console = RecordingSink::new();
            let mut router = router(&console);
            let mut cycle = SensorCycle::starting_at(&router, start);
            let now = Instant::from_millis(0);

            for step in 1..=IDS.len() {
                let progress = cycle.step(&mut router, &[OutputKind::Console], now);
                assert_eq!(progress.is_finished(), step == IDS.len(), "start {}", start);
                assert_eq!(progress.is_finished(), cycle.cursor() == start);
            }

            let mut seen = visited(&console);
            assert_eq!(seen.len(), IDS.len());
            assert_eq!(seen[0], IDS[start]);
            seen.sort();
            assert_eq!(seen, IDS.to_vec());
        }
    }

    #[test]
    fn test_start_wraps_modulo_count() {
        let console = RecordingSink::new();
        let router = router(&console);
        assert_eq!(SensorCycle::starting_at(&router, 6).cursor(), 2);
    }

    #[test]
    fn test_no_sensors_finishes_immediately() {
        let console = RecordingSink::new();
        let mut router = Router::new().with_sink(OutputKind::Console, console.clone());
        let mut cycle = SensorCycle::new(&router);

        assert_eq!(
            cycle.step(&mut router, &[OutputKind::Console], Instant::from_millis(0)),
            Progress::Finished
        );
        assert!(console.readings().is_empty());
    }

    #[test]
    fn test_read_all_skips_paged_outputs() {
        let console = RecordingSink::new();
        let display = RecordingSink::paged();
        let mut router = router(&console).with_sink(OutputKind::Display, display.clone());

        let progress = read_all_sensors(
            &mut router,
            &[OutputKind::Display, OutputKind::Console],
            Instant::from_millis(0),
        );

        assert_eq!(progress, Progress::Finished);
        assert_eq!(visited(&console), IDS.to_vec());
        assert!(display.readings().is_empty());
    }
}
