//! Inbound event dispatch with per-participant ordering
//!
//! Events are spread over a fixed number of lanes keyed by participant id.
//! Each lane is drained by one worker, so a participant's events are handled
//! strictly in arrival order while different participants proceed in
//! parallel. The lane count is also the bound on concurrently handled events.

use crate::bot::ChatHandler;
use crate::types::{InboundEvent, ParticipantId};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

pub struct EventDispatcher {
    lanes: Vec<mpsc::Sender<InboundEvent>>,
    workers: JoinSet<()>,
}

impl EventDispatcher {
    /// Spawn `lane_count` workers feeding `handler`; each lane buffers up to
    /// `lane_capacity` events before `dispatch` waits.
    pub fn new(handler: ChatHandler, lane_count: usize, lane_capacity: usize) -> Self {
        let lane_count = lane_count.max(1);
        let mut lanes = Vec::with_capacity(lane_count);
        let mut workers = JoinSet::new();

        for _ in 0..lane_count {
            let (tx, mut rx) = mpsc::channel::<InboundEvent>(lane_capacity.max(1));
            let handler = handler.clone();
            workers.spawn(async move {
                while let Some(event) = rx.recv().await {
                    let participant = event.participant;
                    if let Err(e) = handler.on_event(event).await {
                        debug!("Event from participant {} failed: {}", participant, e);
                    }
                }
            });
            lanes.push(tx);
        }

        Self { lanes, workers }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lane that owns every event of `participant`
    pub fn lane_for(&self, participant: ParticipantId) -> usize {
        participant.rem_euclid(self.lanes.len() as i64) as usize
    }

    /// Queue `event` behind earlier events of the same participant.
    ///
    /// Returns `false` once the lane's worker is gone.
    pub async fn dispatch(&self, event: InboundEvent) -> bool {
        let lane = self.lane_for(event.participant);
        self.lanes[lane].send(event).await.is_ok()
    }

    /// Close every lane and wait until queued events are handled
    pub async fn finish(self) {
        let Self { lanes, mut workers } = self;
        drop(lanes);

        while workers.join_next().await.is_some() {}
        info!("All event lanes drained");
    }
}
