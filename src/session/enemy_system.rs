use super::{Dispatch, RaceSession};
use crate::server_protocol::ServerEvent;
use crate::types::RacePhase;

impl RaceSession {
    pub fn tick_enemies(&mut self, _now_ms: u64) {
        if self.phase != RacePhase::Racing {
            return;
        }
        for enemy in &mut self.enemies {
            enemy.advance(&self.course, &self.config, &mut self.rng);
        }
        self.outbox.push(Dispatch::broadcast(ServerEvent::EnemyTick {
            enemies: self.enemies.clone(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use crate::session::tests::{event_types, lobby_with_racers, racing_with_racers};

    #[test]
    fn enemies_only_move_while_racing() {
        let (mut session, _) = lobby_with_racers(2);
        let before = session.enemies().to_vec();
        session.tick_enemies(16);
        assert!(session.drain_outbox().is_empty());
        assert_eq!(session.enemies(), before.as_slice());
    }

    #[test]
    fn each_tick_broadcasts_the_full_roster() {
        let (mut session, _) = racing_with_racers(2);
        let before = session.enemies().to_vec();
        session.tick_enemies(3_016);
        let dispatches = session.drain_outbox();
        assert_eq!(event_types(&dispatches), vec!["enemy-tick"]);
        let value = serde_json::to_value(&dispatches[0].event).expect("tick should serialize");
        assert_eq!(
            value["enemies"].as_array().map(Vec::len),
            Some(session.config().enemy_count)
        );
        assert_ne!(session.enemies(), before.as_slice());
    }

    #[test]
    fn same_seed_and_commands_replay_the_same_enemies() {
        let (mut a, _) = racing_with_racers(2);
        let (mut b, _) = racing_with_racers(2);
        for tick in 0..600 {
            a.tick_enemies(3_000 + tick * 16);
            b.tick_enemies(3_000 + tick * 16);
        }
        assert_eq!(a.enemies(), b.enemies());
        for enemy in a.enemies() {
            assert!(enemy.body.x >= 0.0 && enemy.body.x + enemy.body.width <= 3_200.0 + 0.01);
        }
    }
}
