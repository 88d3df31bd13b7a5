use tracing::{debug, info};

use super::{Dispatch, RaceSession};
use crate::constants::CORRECTION_TOLERANCE;
use crate::physics::{clamp_to_world, has_fallen_out, is_supported, resolve_solids};
use crate::server_protocol::{MoveReport, ServerEvent};
use crate::types::{BlockKind, FinishRecord, RaceEndReason, RacePhase};

impl RaceSession {
    pub fn report_move(&mut self, conn_id: &str, report: MoveReport, now_ms: u64) {
        if self.phase != RacePhase::Racing || !report.is_finite() {
            return;
        }
        let Some(participant) = self.participants.get_mut(conn_id) else {
            return;
        };
        if !participant.is_racer() || participant.finished {
            debug!(conn_id, "move report from inactive participant dropped");
            return;
        }

        let body = &mut participant.body;
        let previous_top = body.y;
        body.x = report.x;
        body.y = report.y;
        body.vx = report.vx;
        body.vy = report.vy;
        resolve_solids(body, previous_top, &self.course);
        if !body.on_ground && body.vy >= 0.0 && is_supported(body, &self.course) {
            body.on_ground = true;
        }
        clamp_to_world(body, self.config.world_width);

        if has_fallen_out(body, &self.config) {
            self.respawn(conn_id);
            return;
        }
        if self.resolve_enemy_contact(conn_id) {
            self.respawn(conn_id);
            return;
        }
        self.advance_checkpoint(conn_id);
        let finished = self.check_goal(conn_id, now_ms);
        self.push_correction(conn_id, &report);

        if finished && self.all_racers_finished() {
            self.end_race(RaceEndReason::AllFinished, now_ms);
        }
    }

    fn respawn(&mut self, conn_id: &str) {
        let block = self.config.block_size;
        let Some(participant) = self.participants.get_mut(conn_id) else {
            return;
        };
        let (x, y) = self
            .checkpoints
            .iter()
            .find(|checkpoint| checkpoint.id == participant.current_checkpoint)
            .filter(|_| participant.current_checkpoint > 0)
            .map(|checkpoint| (checkpoint.x, checkpoint.y - block))
            .unwrap_or_else(|| self.config.spawn_point());
        participant.body.place(x, y);
        participant.body.on_ground = false;

        debug!(
            participant_id = %participant.id,
            checkpoint = participant.current_checkpoint,
            x,
            y,
            "participant respawned"
        );
        let event = ServerEvent::ParticipantRespawned {
            participant_id: participant.id.clone(),
            x,
            y,
        };
        self.outbox.push(Dispatch::broadcast(event));
    }

    fn resolve_enemy_contact(&mut self, conn_id: &str) -> bool {
        let Some(participant) = self.participants.get_mut(conn_id) else {
            return false;
        };
        let racer_box = participant.body.aabb();
        let descending = participant.body.vy > 0.0;

        for enemy in self.enemies.iter_mut().filter(|enemy| enemy.active) {
            if !racer_box.overlaps(&enemy.body.aabb()) {
                continue;
            }
            if descending && racer_box.y < enemy.body.y {
                enemy.active = false;
                participant.body.vy = self.config.physics.stomp_bounce;
                participant.body.on_ground = false;
                debug!(participant_id = %participant.id, enemy_id = %enemy.id, "enemy stomped");
                self.outbox
                    .push(Dispatch::broadcast(ServerEvent::EnemyDefeated {
                        enemy_id: enemy.id.clone(),
                        participant_id: participant.id.clone(),
                    }));
            } else {
                debug!(participant_id = %participant.id, enemy_id = %enemy.id, "hit by enemy");
                return true;
            }
        }
        false
    }

    fn advance_checkpoint(&mut self, conn_id: &str) {
        let Some(participant) = self.participants.get_mut(conn_id) else {
            return;
        };
        let racer_box = participant.body.aabb();
        let reached = self
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.id > participant.current_checkpoint)
            .filter(|checkpoint| racer_box.overlaps(&checkpoint.aabb()))
            .map(|checkpoint| checkpoint.id)
            .max();
        let Some(checkpoint_id) = reached else {
            return;
        };
        participant.current_checkpoint = checkpoint_id;
        debug!(participant_id = %participant.id, checkpoint_id, "checkpoint reached");
        self.outbox
            .push(Dispatch::broadcast(ServerEvent::CheckpointProgress {
                participant_id: participant.id.clone(),
                checkpoint_id,
            }));
    }

    fn check_goal(&mut self, conn_id: &str, now_ms: u64) -> bool {
        let Some(goal) = self
            .course
            .iter()
            .find(|block| block.kind == BlockKind::Goal)
        else {
            return false;
        };
        let Some(participant) = self.participants.get_mut(conn_id) else {
            return false;
        };
        if participant.finished || !participant.body.aabb().overlaps(&goal.aabb()) {
            return false;
        }

        let elapsed_ms = now_ms.saturating_sub(self.race_started_at_ms.unwrap_or(now_ms));
        let rank = self.finish_records.len() as u32 + 1;
        participant.finished = true;
        participant.finish_time_ms = Some(elapsed_ms);
        self.finish_records.push(FinishRecord {
            participant_id: participant.id.clone(),
            name: participant.name.clone(),
            elapsed_ms,
            rank,
        });

        info!(participant_id = %participant.id, rank, elapsed_ms, "participant finished");
        self.outbox
            .push(Dispatch::broadcast(ServerEvent::ParticipantFinished {
                participant_id: participant.id.clone(),
                name: participant.name.clone(),
                elapsed_ms,
                rank,
            }));
        true
    }

    fn push_correction(&mut self, conn_id: &str, report: &MoveReport) {
        let Some(participant) = self.participants.get(conn_id) else {
            return;
        };
        let body = &participant.body;
        let event = ServerEvent::ParticipantCorrected {
            participant_id: participant.id.clone(),
            x: body.x,
            y: body.y,
            vx: body.vx,
            vy: body.vy,
            on_ground: body.on_ground,
        };
        let divergence = (body.x - report.x)
            .abs()
            .max((body.y - report.y).abs())
            .max((body.vx - report.vx).abs())
            .max((body.vy - report.vy).abs());

        if divergence > CORRECTION_TOLERANCE {
            self.outbox.push(Dispatch::only(conn_id, event.clone()));
        }
        self.outbox.push(Dispatch::all_except(conn_id, event));
    }
}
