use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::config::RaceConfig;
use crate::constants::SPECTATOR_NAME;
use crate::course::generate_course;
use crate::enemy::Enemy;
use crate::error::JoinError;
use crate::physics::Body;
use crate::rng::Rng;
use crate::server_protocol::{ClientCommand, ServerEvent};
use crate::server_utils::{hsl_color, sanitize_chat, sanitize_name};
use crate::types::{
    Checkpoint, CourseBlock, FinishRecord, Participant, RaceEndReason, RacePhase, Role,
    RosterCounts,
};

mod enemy_system;
mod progress;
mod timer;

pub use self::timer::Timer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Broadcast,
    Only(String),
    AllExcept(String),
}

#[derive(Clone, Debug)]
pub struct Dispatch {
    pub delivery: Delivery,
    pub event: ServerEvent,
}

impl Dispatch {
    pub fn broadcast(event: ServerEvent) -> Self {
        Self {
            delivery: Delivery::Broadcast,
            event,
        }
    }

    pub fn only(conn_id: &str, event: ServerEvent) -> Self {
        Self {
            delivery: Delivery::Only(conn_id.to_string()),
            event,
        }
    }

    pub fn all_except(conn_id: &str, event: ServerEvent) -> Self {
        Self {
            delivery: Delivery::AllExcept(conn_id.to_string()),
            event,
        }
    }

    pub fn reaches(&self, conn_id: &str) -> bool {
        match &self.delivery {
            Delivery::Broadcast => true,
            Delivery::Only(target) => target == conn_id,
            Delivery::AllExcept(origin) => origin != conn_id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RaceSession {
    config: RaceConfig,
    phase: RacePhase,
    rng: Rng,
    seed: u32,

    participants: BTreeMap<String, Participant>,
    ready: BTreeSet<String>,

    course: Vec<CourseBlock>,
    checkpoints: Vec<Checkpoint>,
    enemies: Vec<Enemy>,
    finish_records: Vec<FinishRecord>,

    race_started_at_ms: Option<u64>,
    countdown: Timer,
    race_timer: Timer,

    outbox: Vec<Dispatch>,
}

impl RaceSession {
    pub fn new(config: RaceConfig, seed: u32) -> Self {
        let mut rng = Rng::new(seed);
        let course_seed = rng.next_u32();
        let generated = generate_course(&config, course_seed);
        Self {
            config,
            phase: RacePhase::Lobby,
            rng,
            seed: course_seed,
            participants: BTreeMap::new(),
            ready: BTreeSet::new(),
            course: generated.course,
            checkpoints: generated.checkpoints,
            enemies: generated.enemies,
            finish_records: Vec::new(),
            race_started_at_ms: None,
            countdown: Timer::default(),
            race_timer: Timer::default(),
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn participant(&self, conn_id: &str) -> Option<&Participant> {
        self.participants.get(conn_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn course(&self) -> &[CourseBlock] {
        &self.course
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn finish_records(&self) -> &[FinishRecord] {
        &self.finish_records
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn racer_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_racer()).count()
    }

    pub fn roster_counts(&self) -> RosterCounts {
        let racers = self.racer_count();
        RosterCounts {
            total: self.participants.len(),
            racers,
            spectators: self.participants.len() - racers,
        }
    }

    pub fn all_racers_finished(&self) -> bool {
        let mut racers = self.participants.values().filter(|p| p.is_racer()).peekable();
        racers.peek().is_some() && racers.all(|p| p.finished)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match (self.countdown.deadline(), self.race_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn remaining_race_ms(&self, now_ms: u64) -> Option<u64> {
        self.race_timer.remaining(now_ms)
    }

    pub fn drain_outbox(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.outbox)
    }

    pub fn handle(&mut self, conn_id: &str, command: ClientCommand, now_ms: u64) {
        match command {
            ClientCommand::Join { name } => {
                if let Err(error) = self.join(conn_id, &name, now_ms) {
                    debug!(conn_id, %error, "join rejected");
                }
            }
            ClientCommand::Spectate => {
                if let Err(error) = self.spectate(conn_id, now_ms) {
                    debug!(conn_id, %error, "spectate rejected");
                }
            }
            ClientCommand::SignalReady => self.signal_ready(conn_id, now_ms),
            ClientCommand::ReportMove(report) => self.report_move(conn_id, report, now_ms),
            ClientCommand::SendChat { text } => self.send_chat(conn_id, &text, now_ms),
        }
    }

    pub fn reject(&mut self, conn_id: &str, reason: impl Into<String>) {
        self.outbox.push(Dispatch::only(
            conn_id,
            ServerEvent::Rejected {
                reason: reason.into(),
            },
        ));
    }

    pub fn join(&mut self, conn_id: &str, name: &str, now_ms: u64) -> Result<(), JoinError> {
        let refusal = if self.participants.contains_key(conn_id) {
            Some(JoinError::AlreadyJoined)
        } else if self.racer_count() >= self.config.max_racers {
            Some(JoinError::RaceFull {
                capacity: self.config.max_racers,
            })
        } else {
            None
        };
        if let Some(error) = refusal {
            self.reject(conn_id, error.to_string());
            return Err(error);
        }

        let participant = self.new_participant(conn_id, sanitize_name(name), Role::Racer);
        self.admit(participant, now_ms);
        Ok(())
    }

    pub fn spectate(&mut self, conn_id: &str, now_ms: u64) -> Result<(), JoinError> {
        if self.participants.contains_key(conn_id) {
            let error = JoinError::AlreadyJoined;
            self.reject(conn_id, error.to_string());
            return Err(error);
        }
        let participant =
            self.new_participant(conn_id, SPECTATOR_NAME.to_string(), Role::Spectator);
        self.admit(participant, now_ms);
        Ok(())
    }

    pub fn leave(&mut self, conn_id: &str, now_ms: u64) {
        let Some(participant) = self.participants.remove(conn_id) else {
            return;
        };
        self.ready.remove(conn_id);
        info!(
            participant_id = %participant.id,
            name = %participant.name,
            phase = ?self.phase,
            "participant left"
        );

        self.outbox.push(Dispatch::broadcast(ServerEvent::ParticipantLeft {
            participant_id: participant.id.clone(),
        }));
        self.push_roster_counts();

        match self.phase {
            RacePhase::Lobby => self.check_ready_quorum(now_ms),
            RacePhase::Racing if participant.is_racer() => {
                if self.racer_count() <= 1 {
                    self.end_race(RaceEndReason::NotEnoughRacers, now_ms);
                } else if self.all_racers_finished() {
                    self.end_race(RaceEndReason::AllFinished, now_ms);
                }
            }
            _ => {}
        }
    }

    pub fn signal_ready(&mut self, conn_id: &str, now_ms: u64) {
        let Some(participant) = self.participants.get(conn_id) else {
            return;
        };
        if !participant.is_racer() {
            debug!(conn_id, "ready signal from spectator dropped");
            return;
        }
        if self.phase == RacePhase::Finished {
            self.transition(RacePhase::Lobby);
        }
        if self.phase != RacePhase::Lobby {
            debug!(conn_id, phase = ?self.phase, "ready signal outside the lobby dropped");
            return;
        }
        self.ready.insert(conn_id.to_string());
        self.check_ready_quorum(now_ms);
    }

    pub fn send_chat(&mut self, conn_id: &str, text: &str, now_ms: u64) {
        let Some(participant) = self.participants.get(conn_id) else {
            return;
        };
        let Some(text) = sanitize_chat(text) else {
            return;
        };
        let event = ServerEvent::ChatBroadcast {
            participant_id: participant.id.clone(),
            name: participant.name.clone(),
            text,
            at_ms: now_ms,
        };
        self.outbox.push(Dispatch::broadcast(event));
    }

    pub fn poll_timers(&mut self, now_ms: u64) {
        if self.countdown.fire_if_due(now_ms) {
            self.start_race(now_ms);
        }
        if self.race_timer.fire_if_due(now_ms) {
            self.end_race(RaceEndReason::TimeUp, now_ms);
        }
    }

    fn new_participant(&mut self, conn_id: &str, name: String, role: Role) -> Participant {
        let (x, y) = self.config.spawn_point();
        let size = self.config.block_size;
        Participant {
            id: conn_id.to_string(),
            name,
            role,
            body: Body::new(x, y, size, size),
            finished: false,
            finish_time_ms: None,
            current_checkpoint: 0,
            color: hsl_color(self.rng.spread(0.0, 360.0)),
        }
    }

    fn admit(&mut self, participant: Participant, now_ms: u64) {
        let conn_id = participant.id.clone();
        info!(
            participant_id = %conn_id,
            name = %participant.name,
            role = ?participant.role,
            phase = ?self.phase,
            "participant joined"
        );
        let role = participant.role;
        self.participants.insert(conn_id.clone(), participant.clone());

        let snapshot = self.snapshot_for(&conn_id, role, now_ms);
        self.outbox.push(Dispatch::only(&conn_id, snapshot));
        self.outbox.push(Dispatch::all_except(
            &conn_id,
            ServerEvent::ParticipantJoined { participant },
        ));
        self.push_roster_counts();
    }

    fn snapshot_for(&self, conn_id: &str, role: Role, now_ms: u64) -> ServerEvent {
        ServerEvent::Joined {
            participant_id: conn_id.to_string(),
            role,
            config: self.config.clone(),
            phase: self.phase,
            participants: self.participants.values().cloned().collect(),
            course: self.course.clone(),
            checkpoints: self.checkpoints.clone(),
            enemies: self.enemies.clone(),
            remaining_ms: self.remaining_race_ms(now_ms),
        }
    }

    fn push_roster_counts(&mut self) {
        let counts = self.roster_counts();
        self.outbox
            .push(Dispatch::broadcast(ServerEvent::RosterCounts(counts)));
    }

    fn transition(&mut self, next: RacePhase) -> bool {
        if !self.phase.can_transition_to(next) {
            warn!(from = ?self.phase, to = ?next, "refused phase transition");
            return false;
        }
        info!(from = ?self.phase, to = ?next, "phase changed");
        self.phase = next;
        true
    }

    fn check_ready_quorum(&mut self, now_ms: u64) {
        if self.phase != RacePhase::Lobby {
            return;
        }
        let ready = self.ready.len();
        if ready >= self.config.min_ready_racers && ready == self.racer_count() {
            self.begin_countdown(now_ms);
        }
    }

    fn begin_countdown(&mut self, now_ms: u64) {
        if !self.transition(RacePhase::Countdown) {
            return;
        }
        self.countdown.arm(now_ms, self.config.countdown_ms);
        self.outbox
            .push(Dispatch::broadcast(ServerEvent::CountdownStarted {
                duration_ms: self.config.countdown_ms,
            }));
    }

    fn start_race(&mut self, now_ms: u64) {
        if !self.transition(RacePhase::Racing) {
            return;
        }
        let seed = self.rng.next_u32();
        let generated = generate_course(&self.config, seed);
        self.seed = seed;
        self.course = generated.course;
        self.checkpoints = generated.checkpoints;
        self.enemies = generated.enemies;

        let (x, y) = self.config.spawn_point();
        for participant in self.participants.values_mut().filter(|p| p.is_racer()) {
            participant.body.place(x, y);
            participant.body.on_ground = false;
            participant.finished = false;
            participant.finish_time_ms = None;
            participant.current_checkpoint = 0;
        }
        self.ready.clear();
        self.finish_records.clear();
        self.race_started_at_ms = Some(now_ms);
        self.race_timer.arm(now_ms, self.config.race_duration_ms);

        info!(seed, racers = self.racer_count(), "race started");
        self.outbox
            .push(Dispatch::broadcast(ServerEvent::RaceStarted {
                seed,
                duration_ms: self.config.race_duration_ms,
                course: self.course.clone(),
                checkpoints: self.checkpoints.clone(),
                enemies: self.enemies.clone(),
                participants: self.participants.values().cloned().collect(),
            }));

        match self.racer_count() {
            0 => self.end_race(RaceEndReason::Abandoned, now_ms),
            1 => self.end_race(RaceEndReason::NotEnoughRacers, now_ms),
            _ => {}
        }
    }

    fn end_race(&mut self, reason: RaceEndReason, now_ms: u64) {
        if !self.transition(RacePhase::Finished) {
            return;
        }
        self.countdown.disarm();
        self.race_timer.disarm();
        self.ready.clear();
        self.race_started_at_ms = None;

        let unfinished: Vec<Participant> = self
            .participants
            .values()
            .filter(|p| p.is_racer() && !p.finished)
            .cloned()
            .collect();
        info!(
            ?reason,
            finishers = self.finish_records.len(),
            unfinished = unfinished.len(),
            now_ms,
            "race ended"
        );
        self.outbox.push(Dispatch::broadcast(ServerEvent::RaceEnded {
            reason,
            results: self.finish_records.clone(),
            unfinished,
            participants: self.participants.values().cloned().collect(),
        }));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::Value;

    pub(crate) fn event_types(dispatches: &[Dispatch]) -> Vec<String> {
        dispatches
            .iter()
            .map(|dispatch| {
                let value = serde_json::to_value(&dispatch.event).expect("event should serialize");
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    pub(crate) fn find_event(dispatches: &[Dispatch], event_type: &str) -> Option<Value> {
        dispatches.iter().find_map(|dispatch| {
            let value = serde_json::to_value(&dispatch.event).expect("event should serialize");
            (value["type"] == event_type).then_some(value)
        })
    }

    pub(crate) fn lobby_with_racers(count: usize) -> (RaceSession, Vec<String>) {
        let mut session = RaceSession::new(RaceConfig::default(), 42);
        let ids: Vec<String> = (0..count).map(|idx| format!("conn_{}", idx + 1)).collect();
        for (idx, id) in ids.iter().enumerate() {
            session
                .join(id, &format!("P{}", idx + 1), 0)
                .expect("join should succeed");
        }
        session.drain_outbox();
        (session, ids)
    }

    // Racing session, race started at `now = countdown_ms`.
    pub(crate) fn racing_with_racers(count: usize) -> (RaceSession, Vec<String>) {
        let (mut session, ids) = lobby_with_racers(count);
        for id in &ids {
            session.signal_ready(id, 0);
        }
        let countdown = session.config().countdown_ms;
        session.poll_timers(countdown);
        assert_eq!(session.phase(), RacePhase::Racing);
        session.drain_outbox();
        (session, ids)
    }

    #[test]
    fn join_delivers_snapshot_and_roster_delta() {
        let (mut session, _) = lobby_with_racers(1);
        session.join("conn_9", "  Luigi  ", 5).expect("join should succeed");
        let dispatches = session.drain_outbox();
        assert_eq!(
            event_types(&dispatches),
            vec!["joined", "participant-joined", "roster-counts"]
        );
        assert_eq!(dispatches[0].delivery, Delivery::Only("conn_9".to_string()));
        assert_eq!(
            dispatches[1].delivery,
            Delivery::AllExcept("conn_9".to_string())
        );

        let joined = find_event(&dispatches, "joined").expect("joined event");
        assert_eq!(joined["participants"].as_array().map(Vec::len), Some(2));
        assert_eq!(joined["phase"], "lobby");
        assert_eq!(joined["config"]["physics"]["jumpForce"], -15.0);

        let participant = session.participant("conn_9").expect("participant exists");
        assert_eq!(participant.name, "Luigi");
        assert_eq!(participant.role, Role::Racer);
        assert_eq!(
            (participant.body.x, participant.body.y),
            session.config().spawn_point()
        );
        assert_eq!((participant.body.vx, participant.body.vy), (0.0, 0.0));
        assert!(participant.color.starts_with("hsl("));
    }

    #[test]
    fn join_beyond_capacity_is_rejected_without_mutation() {
        let (mut session, _) = lobby_with_racers(8);
        let result = session.join("conn_late", "Late", 0);
        assert_eq!(result, Err(JoinError::RaceFull { capacity: 8 }));
        let dispatches = session.drain_outbox();
        assert_eq!(event_types(&dispatches), vec!["rejected"]);
        assert_eq!(
            dispatches[0].delivery,
            Delivery::Only("conn_late".to_string())
        );
        assert!(session.participant("conn_late").is_none());
        assert_eq!(session.racer_count(), 8);

        // Spectators never count toward capacity.
        session
            .spectate("conn_watch", 0)
            .expect("spectator should be admitted");
        assert_eq!(session.roster_counts().spectators, 1);
    }

    #[test]
    fn joining_twice_is_rejected() {
        let (mut session, ids) = lobby_with_racers(1);
        assert_eq!(session.join(&ids[0], "Again", 0), Err(JoinError::AlreadyJoined));
        assert_eq!(session.spectate(&ids[0], 0), Err(JoinError::AlreadyJoined));
        assert_eq!(session.racer_count(), 1);
    }

    #[test]
    fn two_ready_racers_count_down_then_race_on_a_fresh_course() {
        let (mut session, ids) = lobby_with_racers(2);
        let lobby_seed = session.seed();

        session.signal_ready(&ids[0], 100);
        assert_eq!(session.phase(), RacePhase::Lobby);
        session.signal_ready(&ids[1], 100);
        assert_eq!(session.phase(), RacePhase::Countdown);
        assert_eq!(
            event_types(&session.drain_outbox()),
            vec!["countdown-started"]
        );
        assert_eq!(session.next_deadline(), Some(3_100));

        session.poll_timers(3_099);
        assert_eq!(session.phase(), RacePhase::Countdown);
        session.poll_timers(3_100);
        assert_eq!(session.phase(), RacePhase::Racing);

        let dispatches = session.drain_outbox();
        let started = find_event(&dispatches, "race-started").expect("race-started event");
        assert_eq!(started["seed"], session.seed());
        assert_ne!(session.seed(), lobby_seed);
        assert_eq!(session.ready_count(), 0);
        assert_eq!(session.next_deadline(), Some(3_100 + 300_000));
        for participant in session.participants() {
            assert_eq!(participant.current_checkpoint, 0);
            assert!(!participant.finished);
        }
    }

    #[test]
    fn a_single_ready_racer_never_starts_a_race() {
        let (mut session, ids) = lobby_with_racers(1);
        session.signal_ready(&ids[0], 0);
        assert_eq!(session.phase(), RacePhase::Lobby);
        assert_eq!(session.ready_count(), 1);
    }

    #[test]
    fn spectators_are_outside_the_quorum() {
        let (mut session, ids) = lobby_with_racers(2);
        session.spectate("conn_watch", 0).expect("spectate should succeed");
        session.signal_ready("conn_watch", 0);
        assert_eq!(session.ready_count(), 0);
        session.signal_ready(&ids[0], 0);
        session.signal_ready(&ids[1], 0);
        assert_eq!(session.phase(), RacePhase::Countdown);
    }

    #[test]
    fn departure_of_the_last_unready_racer_completes_the_quorum() {
        let (mut session, ids) = lobby_with_racers(3);
        session.signal_ready(&ids[0], 0);
        session.signal_ready(&ids[1], 0);
        assert_eq!(session.phase(), RacePhase::Lobby);
        session.leave(&ids[2], 10);
        assert_eq!(session.phase(), RacePhase::Countdown);
    }

    #[test]
    fn leaving_clears_readiness_and_is_idempotent() {
        let (mut session, ids) = lobby_with_racers(3);
        session.signal_ready(&ids[0], 0);
        session.leave(&ids[0], 0);
        assert_eq!(session.ready_count(), 0);
        let dispatches = session.drain_outbox();
        assert_eq!(
            event_types(&dispatches),
            vec!["participant-left", "roster-counts"]
        );

        session.leave(&ids[0], 0);
        assert!(session.drain_outbox().is_empty());
        assert_eq!(session.racer_count(), 2);
    }

    #[test]
    fn countdown_cannot_be_cancelled_and_ignores_gameplay() {
        let (mut session, ids) = lobby_with_racers(2);
        session.signal_ready(&ids[0], 0);
        session.signal_ready(&ids[1], 0);
        session.drain_outbox();

        let before = session.participant(&ids[0]).cloned();
        session.report_move(
            &ids[0],
            crate::server_protocol::MoveReport {
                x: 400.0,
                y: 100.0,
                vx: 1.0,
                vy: 1.0,
                on_ground: false,
            },
            10,
        );
        session.tick_enemies(10);
        assert!(session.drain_outbox().is_empty());
        assert_eq!(session.participant(&ids[0]).cloned(), before);

        session.leave(&ids[1], 20);
        assert_eq!(session.phase(), RacePhase::Countdown);
    }

    #[test]
    fn countdown_ending_with_a_lone_racer_finishes_at_once() {
        let (mut session, ids) = lobby_with_racers(2);
        session.signal_ready(&ids[0], 0);
        session.signal_ready(&ids[1], 0);
        session.leave(&ids[1], 20);
        session.drain_outbox();

        session.poll_timers(3_000);
        assert_eq!(session.phase(), RacePhase::Finished);
        assert_eq!(session.next_deadline(), None);
        let dispatches = session.drain_outbox();
        assert_eq!(event_types(&dispatches), vec!["race-started", "race-ended"]);
        let ended = find_event(&dispatches, "race-ended").expect("race-ended event");
        assert_eq!(ended["reason"], "not-enough-racers");
        assert_eq!(ended["unfinished"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn countdown_ending_with_no_racers_is_abandoned() {
        let (mut session, ids) = lobby_with_racers(2);
        session.signal_ready(&ids[0], 0);
        session.signal_ready(&ids[1], 0);
        session.leave(&ids[0], 10);
        session.leave(&ids[1], 20);
        session.drain_outbox();

        session.poll_timers(3_000);
        assert_eq!(session.phase(), RacePhase::Finished);
        let ended = find_event(&session.drain_outbox(), "race-ended").expect("race-ended event");
        assert_eq!(ended["reason"], "abandoned");
    }

    #[test]
    fn disconnect_down_to_one_racer_forces_finished() {
        let (mut session, ids) = racing_with_racers(2);
        session.leave(&ids[1], 5_000);
        assert_eq!(session.phase(), RacePhase::Finished);
        assert_eq!(session.next_deadline(), None);

        let dispatches = session.drain_outbox();
        let ended = find_event(&dispatches, "race-ended").expect("race-ended event");
        assert_eq!(ended["reason"], "not-enough-racers");
        assert_eq!(ended["results"].as_array().map(Vec::len), Some(0));
        assert_eq!(ended["unfinished"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn spectator_leaving_mid_race_does_not_end_it() {
        let (mut session, ids) = racing_with_racers(2);
        session.spectate("conn_watch", 4_000).expect("spectate should succeed");
        session.leave("conn_watch", 4_100);
        assert_eq!(session.phase(), RacePhase::Racing);
        assert_eq!(session.racer_count(), ids.len());
    }

    #[test]
    fn race_timer_elapsing_ends_the_race() {
        let (mut session, _) = racing_with_racers(2);
        let end = session.config().countdown_ms + session.config().race_duration_ms;
        session.poll_timers(end - 1);
        assert_eq!(session.phase(), RacePhase::Racing);
        session.poll_timers(end);
        assert_eq!(session.phase(), RacePhase::Finished);
        let ended = find_event(&session.drain_outbox(), "race-ended").expect("race-ended event");
        assert_eq!(ended["reason"], "time-up");
        assert_eq!(ended["unfinished"].as_array().map(Vec::len), Some(2));
        assert_eq!(ended["participants"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn phases_cycle_back_through_lobby() {
        let (mut session, ids) = racing_with_racers(2);
        let end = session.config().countdown_ms + session.config().race_duration_ms;
        session.poll_timers(end);
        assert_eq!(session.phase(), RacePhase::Finished);

        session.signal_ready(&ids[0], end + 10);
        assert_eq!(session.phase(), RacePhase::Lobby);
        session.signal_ready(&ids[1], end + 20);
        assert_eq!(session.phase(), RacePhase::Countdown);
        session.poll_timers(end + 20 + session.config().countdown_ms);
        assert_eq!(session.phase(), RacePhase::Racing);
    }

    #[test]
    fn late_joiner_races_from_spawn() {
        let (mut session, _) = racing_with_racers(2);
        session.join("conn_late", "Late", 9_000).expect("late join should succeed");
        let joined = find_event(&session.drain_outbox(), "joined").expect("joined event");
        assert_eq!(joined["phase"], "racing");
        assert_eq!(joined["remainingMs"], 300_000 - 6_000);
        assert!(!session.all_racers_finished());
        assert_eq!(session.racer_count(), 3);
    }

    #[test]
    fn chat_is_sanitised_and_requires_a_joined_sender() {
        let (mut session, ids) = lobby_with_racers(1);
        session.send_chat("conn_unknown", "hello", 0);
        session.send_chat(&ids[0], "   ", 0);
        assert!(session.drain_outbox().is_empty());

        session.send_chat(&ids[0], "  good luck  ", 77);
        let dispatches = session.drain_outbox();
        assert_eq!(dispatches[0].delivery, Delivery::Broadcast);
        let chat = find_event(&dispatches, "chat-broadcast").expect("chat event");
        assert_eq!(chat["text"], "good luck");
        assert_eq!(chat["name"], "P1");
        assert_eq!(chat["atMs"], 77);
    }

    #[test]
    fn dispatch_delivery_targets() {
        let event = ServerEvent::Rejected {
            reason: "x".to_string(),
        };
        assert!(Dispatch::broadcast(event.clone()).reaches("a"));
        assert!(Dispatch::only("a", event.clone()).reaches("a"));
        assert!(!Dispatch::only("a", event.clone()).reaches("b"));
        assert!(!Dispatch::all_except("a", event.clone()).reaches("a"));
        assert!(Dispatch::all_except("a", event).reaches("b"));
    }
}
