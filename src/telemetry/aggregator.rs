//! # Telemetry Aggregator
//!
//! Merges independently paced telemetry field groups into the local
//! [`VehicleStateStore`].
//!
//! One updater per field group runs concurrently on the current task. Each
//! updater takes the store lock only to copy its sample in, so the merged
//! state is always "most recent value seen per field". Samples from
//! different groups may come from different instants; that skew is not
//! corrected.

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use super::source::{
    AttitudeSample, BatterySample, FlightModeSample, GpsSample, PositionSample, TelemetrySource,
    VelocitySample,
};
use super::state::{GpsReading, VehicleState};
use super::store::VehicleStateStore;

/// Copies every telemetry field group into a shared state store
#[derive(Debug, Clone)]
pub struct TelemetryAggregator {
    store: VehicleStateStore,
}

impl TelemetryAggregator {
    pub fn new(store: VehicleStateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &VehicleStateStore {
        &self.store
    }

    /// Follow all six subscriptions until every one of them has ended
    ///
    /// A stream that ends or stalls only freezes its own fields; the
    /// other updaters keep running.
    pub async fn run(&self, source: &dyn TelemetrySource) {
        tokio::join!(
            self.follow("position", source.position(), apply_position),
            self.follow("velocity", source.velocity(), apply_velocity),
            self.follow("attitude", source.attitude(), apply_attitude),
            self.follow("flight mode", source.flight_mode(), apply_flight_mode),
            self.follow("battery", source.battery(), apply_battery),
            self.follow("gps", source.gps(), apply_gps),
        );
        warn!("All telemetry streams ended; vehicle state is frozen at last known values");
    }

    async fn follow<T, F>(&self, group: &'static str, mut stream: BoxStream<'static, T>, apply: F)
    where
        F: Fn(&mut VehicleState, T),
    {
        let mut samples: u64 = 0;

        while let Some(sample) = stream.next().await {
            self.store.update(|state| apply(state, sample));
            samples += 1;
            if samples == 1 {
                debug!("First {} sample received", group);
            }
        }

        warn!(
            "{} telemetry stream ended after {} samples; keeping last known values",
            group, samples
        );
    }
}

pub fn apply_position(state: &mut VehicleState, sample: PositionSample) {
    state.latitude = Some(sample.latitude_deg);
    state.longitude = Some(sample.longitude_deg);
    state.absolute_altitude = Some(sample.absolute_altitude_m);
    state.relative_altitude = Some(sample.relative_altitude_m);
}

pub fn apply_velocity(state: &mut VehicleState, sample: VelocitySample) {
    state.speed = Some(sample.horizontal_speed());
}

pub fn apply_attitude(state: &mut VehicleState, sample: AttitudeSample) {
    state.roll = Some(sample.roll_deg);
    state.pitch = Some(sample.pitch_deg);
    state.yaw = Some(sample.yaw_deg);
}

pub fn apply_flight_mode(state: &mut VehicleState, sample: FlightModeSample) {
    state.flight_mode = Some(sample.0);
}

pub fn apply_battery(state: &mut VehicleState, sample: BatterySample) {
    state.battery_percent = Some(sample.remaining_fraction * 100.0);
    state.battery_voltage = Some(sample.voltage_v);
}

pub fn apply_gps(state: &mut VehicleState, sample: GpsSample) {
    state.satellites_visible = Some(GpsReading::from(sample.satellites_visible));
    state.fix_type = Some(GpsReading::from(sample.fix_type));
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Source replaying scripted samples, each preceded by a delay in ms
    #[derive(Default, Clone)]
    struct ScriptedSource {
        position: Vec<(u64, PositionSample)>,
        velocity: Vec<(u64, VelocitySample)>,
        attitude: Vec<(u64, AttitudeSample)>,
        flight_mode: Vec<(u64, FlightModeSample)>,
        battery: Vec<(u64, BatterySample)>,
        gps: Vec<(u64, GpsSample)>,
    }

    fn replay<T: Send + 'static>(script: Vec<(u64, T)>) -> BoxStream<'static, T> {
        stream::iter(script)
            .then(|(delay_ms, sample)| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                sample
            })
            .boxed()
    }

    impl TelemetrySource for ScriptedSource {
        fn position(&self) -> BoxStream<'static, PositionSample> {
            replay(self.position.clone())
        }
        fn velocity(&self) -> BoxStream<'static, VelocitySample> {
            replay(self.velocity.clone())
        }
        fn attitude(&self) -> BoxStream<'static, AttitudeSample> {
            replay(self.attitude.clone())
        }
        fn flight_mode(&self) -> BoxStream<'static, FlightModeSample> {
            replay(self.flight_mode.clone())
        }
        fn battery(&self) -> BoxStream<'static, BatterySample> {
            replay(self.battery.clone())
        }
        fn gps(&self) -> BoxStream<'static, GpsSample> {
            replay(self.gps.clone())
        }
    }

    fn position(n: u32) -> PositionSample {
        PositionSample {
            latitude_deg: 47.0 + n as f64 * 1e-5,
            longitude_deg: 8.0 + n as f64 * 1e-5,
            absolute_altitude_m: 488.0 + n as f64,
            relative_altitude_m: n as f64,
        }
    }

    fn velocity(n: u32) -> VelocitySample {
        VelocitySample { north_m_s: n as f64, east_m_s: 0.0, down_m_s: 0.0 }
    }

    fn attitude(n: u32) -> AttitudeSample {
        AttitudeSample { roll_deg: 0.0, pitch_deg: 0.0, yaw_deg: n as f64 }
    }

    fn flight_mode(n: u32) -> FlightModeSample {
        FlightModeSample(format!("MODE{}", n))
    }

    fn battery(n: u32) -> BatterySample {
        BatterySample { remaining_fraction: 1.0 - n as f64 / 100.0, voltage_v: 16.0 }
    }

    fn gps(n: u32) -> GpsSample {
        GpsSample { satellites_visible: Some(n), fix_type: None }
    }

    fn script<T>(delays: &[u64], make: fn(u32) -> T) -> Vec<(u64, T)> {
        delays.iter().enumerate().map(|(i, &d)| (d, make(i as u32))).collect()
    }

    #[test]
    fn test_apply_battery_converts_fraction_to_percent() {
        let mut state = VehicleState::default();
        apply_battery(&mut state, BatterySample { remaining_fraction: 0.42, voltage_v: 15.1 });
        assert!((state.battery_percent.unwrap() - 42.0).abs() < 1e-9);
        assert_eq!(state.battery_voltage, Some(15.1));
    }

    #[test]
    fn test_apply_gps_marks_missing_values() {
        let mut state = VehicleState::default();
        apply_gps(&mut state, GpsSample { satellites_visible: Some(9), fix_type: None });
        assert_eq!(state.satellites_visible, Some(GpsReading::Value(9)));
        assert_eq!(state.fix_type, Some(GpsReading::NotAvailable));
    }

    #[test]
    fn test_apply_velocity_uses_horizontal_speed() {
        let mut state = VehicleState::default();
        apply_velocity(&mut state, VelocitySample { north_m_s: 0.6, east_m_s: 0.8, down_m_s: 2.0 });
        assert!((state.speed.unwrap() - 1.0).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_stream_keeps_last_value_while_others_continue() {
        let source = ScriptedSource {
            // Position stops after a single sample
            position: script(&[5], position),
            attitude: script(&[10, 10, 10, 10], attitude),
            ..ScriptedSource::default()
        };
        let aggregator = TelemetryAggregator::new(VehicleStateStore::new());
        aggregator.run(&source).await;

        let state = aggregator.store().snapshot();
        assert_eq!(state.latitude, Some(position(0).latitude_deg));
        assert_eq!(state.yaw, Some(3.0));
        assert_eq!(state.speed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_state_visible_before_all_groups_report() {
        let source = ScriptedSource {
            position: script(&[1], position),
            battery: script(&[1_000], battery),
            ..ScriptedSource::default()
        };
        let aggregator = TelemetryAggregator::new(VehicleStateStore::new());
        let store = aggregator.store().clone();

        let handle = tokio::spawn(async move { aggregator.run(&source).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = store.snapshot();
        assert!(state.latitude.is_some());
        assert!(state.battery_percent.is_none());

        handle.await.unwrap();
        assert!(store.snapshot().battery_percent.is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_aggregation_converges_to_latest_sample_per_group(
            position_delays in prop::collection::vec(0u64..50, 1..8),
            velocity_delays in prop::collection::vec(0u64..50, 1..8),
            attitude_delays in prop::collection::vec(0u64..50, 1..8),
            mode_delays in prop::collection::vec(0u64..50, 1..8),
            battery_delays in prop::collection::vec(0u64..50, 1..8),
            gps_delays in prop::collection::vec(0u64..50, 1..8),
        ) {
            let source = ScriptedSource {
                position: script(&position_delays, position),
                velocity: script(&velocity_delays, velocity),
                attitude: script(&attitude_delays, attitude),
                flight_mode: script(&mode_delays, flight_mode),
                battery: script(&battery_delays, battery),
                gps: script(&gps_delays, gps),
            };

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let state = runtime.block_on(async {
                let aggregator = TelemetryAggregator::new(VehicleStateStore::new());
                aggregator.run(&source).await;
                aggregator.store().snapshot()
            });

            let mut expected = VehicleState::default();
            apply_position(&mut expected, position(position_delays.len() as u32 - 1));
            apply_velocity(&mut expected, velocity(velocity_delays.len() as u32 - 1));
            apply_attitude(&mut expected, attitude(attitude_delays.len() as u32 - 1));
            apply_flight_mode(&mut expected, flight_mode(mode_delays.len() as u32 - 1));
            apply_battery(&mut expected, battery(battery_delays.len() as u32 - 1));
            apply_gps(&mut expected, gps(gps_delays.len() as u32 - 1));

            prop_assert_eq!(state, expected);
        }
    }
}
