use crate::{decoder::PointSink, device::Device, recording::RecordingSession};

/// Aggregated result of reading every recording of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    pub recordings: usize,
    pub read: usize,
    pub points: u64,
    /// Set when at least one recording's paged read failed.
    pub failed: bool,
}

impl CollectOutcome {
    /// Process exit code: non-zero iff any read failed.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed)
    }
}

/// Read one recording completely. Returns `Ok(None)` when there was nothing
/// to read, and `Err(())` when the paged read failed.
async fn collect_recording(
    device: &mut Device,
    recording: &mut RecordingSession,
    sink: &mut dyn PointSink,
) -> Result<Option<u64>, ()> {
    let id = recording.id();
    let (start, end) = match recording.get_range().await {
        Ok(range) => range,
        Err(e) => {
            tracing::warn!(recording_id = id, error = %e, "GetRange failed, skipping recording");
            return Ok(None);
        }
    };
    let count = match recording.count_by_range(start, end).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(recording_id = id, error = %e, "CountByRange failed, skipping recording");
            return Ok(None);
        }
    };
    if count == 0 {
        tracing::debug!(recording_id = id, "Recording is empty");
        return Ok(None);
    }

    tracing::info!(
        recording_id = id,
        "Found Recording {id} with {count} Points between {start} and {end}"
    );
    match recording
        .read_by_start_and_count(start, count, device, sink)
        .await
    {
        Ok(summary) => {
            tracing::info!(
                recording_id = id,
                decoded = summary.decoded,
                skipped = summary.skipped,
                requests = summary.requests,
                "Recording read"
            );
            Ok(Some(summary.decoded as u64))
        }
        Err(e) => {
            tracing::error!(recording_id = id, error = %e, "Reading recording failed");
            Err(())
        }
    }
}

/// Read every usable recording of `device` into `sink`. A failing recording
/// is recorded in the outcome and the next one is processed.
pub async fn collect_all(device: &mut Device, sink: &mut dyn PointSink) -> CollectOutcome {
    let mut recordings = device.recordings().await;
    let mut outcome = CollectOutcome {
        recordings: recordings.len(),
        ..Default::default()
    };

    for recording in recordings.iter_mut() {
        match collect_recording(device, recording, sink).await {
            Ok(Some(points)) => {
                outcome.read += 1;
                outcome.points += points;
            }
            Ok(None) => {}
            Err(()) => outcome.failed = true,
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_follows_failure_flag() {
        let mut outcome = CollectOutcome::default();
        assert_eq!(outcome.exit_code(), 0);
        outcome.failed = true;
        assert_eq!(outcome.exit_code(), 1);
    }
}
