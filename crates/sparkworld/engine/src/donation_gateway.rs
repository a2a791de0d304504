//! Bob's donation gateway
//!
//! Bob holds a finite stash that only the replenishment source refills. Pleas
//! queued last tick are heard in submission order; the external judge decides
//! worthiness but the gateway decides whether there is anything to give.

use crate::ledger::Ledger;
use crate::oracles::DonationJudge;
use rand::Rng;
use sparkworld_types::action::Plea;
use sparkworld_types::agent::Spark;
use sparkworld_types::event::{DeclineReason, TickEvent};
use std::time::Duration;
use tracing::{debug, warn};

/// Bob's stash and its lifetime totals
#[derive(Clone, Debug, Default)]
pub struct DonationGateway {
    stash: Spark,
    total_donated: Spark,
    total_replenished: Spark,
}

/// Outcome of hearing a tick's pleas
#[derive(Clone, Debug, Default)]
pub struct DonationRound {
    /// Events, one per plea
    pub events: Vec<TickEvent>,
    /// Spark handed out
    pub donated: Spark,
}

impl DonationGateway {
    /// Create a gateway; the opening stash counts as replenishment
    pub fn new(initial_stash: Spark) -> Self {
        Self {
            stash: initial_stash,
            total_donated: 0,
            total_replenished: initial_stash,
        }
    }

    /// Spark Bob can still give
    pub fn stash(&self) -> Spark {
        self.stash
    }

    /// Lifetime donations
    pub fn total_donated(&self) -> Spark {
        self.total_donated
    }

    /// Lifetime replenishment, opening stash included
    pub fn total_replenished(&self) -> Spark {
        self.total_replenished
    }

    /// Hear every plea in order, donating from the stash on acceptance
    ///
    /// Once the stash is empty the remaining pleas are declined without
    /// consulting the judge. A judge error or timeout is a decline.
    pub async fn resolve_pleas<R: Rng + Send>(
        &mut self,
        pleas: Vec<Plea>,
        judge: &dyn DonationJudge,
        timeout: Duration,
        max_donation: Spark,
        ledger: &mut Ledger,
        rng: &mut R,
    ) -> DonationRound {
        let mut round = DonationRound::default();

        for plea in pleas {
            let agent = plea.agent;
            if !ledger.is_alive(&agent) {
                round.events.push(TickEvent::PleaDeclined {
                    agent,
                    reason: DeclineReason::RequesterDissolved,
                });
                continue;
            }
            if self.stash == 0 {
                round.events.push(TickEvent::PleaDeclined {
                    agent,
                    reason: DeclineReason::StashEmpty,
                });
                continue;
            }

            let accepted = match tokio::time::timeout(timeout, judge.judge(&plea)).await {
                Ok(Ok(accepted)) => accepted,
                Ok(Err(e)) => {
                    warn!(agent = %agent, error = %e, "Donation judge failed");
                    round.events.push(TickEvent::PleaDeclined {
                        agent,
                        reason: DeclineReason::JudgeFailed,
                    });
                    continue;
                }
                Err(_) => {
                    warn!(agent = %agent, "Donation judge timed out");
                    round.events.push(TickEvent::PleaDeclined {
                        agent,
                        reason: DeclineReason::JudgeFailed,
                    });
                    continue;
                }
            };

            if !accepted {
                round.events.push(TickEvent::PleaDeclined {
                    agent,
                    reason: DeclineReason::Judged,
                });
                continue;
            }

            let amount = rng.gen_range(1..=max_donation.min(self.stash));
            self.stash -= amount;
            self.total_donated += amount;
            round.donated += amount;
            ledger.credit(&agent, amount);
            debug!(agent = %agent, amount, stash = self.stash, "Donation granted");
            round.events.push(TickEvent::DonationGranted {
                agent,
                amount,
                stash_after: self.stash,
            });
        }

        round
    }

    /// Add the tick's replenishment to the stash
    pub fn replenish(&mut self, amount: Spark) -> Option<TickEvent> {
        if amount == 0 {
            return None;
        }
        self.stash += amount;
        self.total_replenished += amount;
        Some(TickEvent::StashReplenished {
            amount,
            stash_after: self.stash,
        })
    }

    /// Panic if Bob has given more than he ever received
    pub fn audit(&self) {
        if self.total_donated + self.stash != self.total_replenished {
            panic!(
                "stash invariant violated: donated {} + stash {} != replenished {}",
                self.total_donated, self.stash, self.total_replenished
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracles::scripted::ScriptedDonations;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use sparkworld_types::agent::AgentProfile;
    use sparkworld_types::ids::{AgentId, TickId};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn pleas(ids: &[AgentId]) -> Vec<Plea> {
        ids.iter()
            .map(|id| Plea {
                agent: *id,
                reason: "hungry".into(),
                tick: TickId::new(1),
            })
            .collect()
    }

    fn ledger(n: usize) -> (Ledger, Vec<AgentId>) {
        let mut ledger = Ledger::new();
        let ids = (0..n)
            .map(|_| ledger.open_account(AgentProfile::default(), 1, TickId::genesis()))
            .collect();
        (ledger, ids)
    }

    #[tokio::test]
    async fn test_donations_never_exceed_stash() {
        let (mut ledger, ids) = ledger(6);
        let mut gateway = DonationGateway::new(3);
        let judge = ScriptedDonations::accepting();
        let mut rng = ChaCha12Rng::seed_from_u64(1);

        let round = gateway
            .resolve_pleas(pleas(&ids), &judge, TIMEOUT, 5, &mut ledger, &mut rng)
            .await;

        assert_eq!(gateway.stash(), 0);
        assert_eq!(round.donated, 3);
        assert_eq!(ledger.total_supply(), 6 + 3);
        assert_eq!(round.events.len(), 6);
        assert!(judge.calls() <= 3);
        assert!(matches!(
            round.events.last(),
            Some(TickEvent::PleaDeclined {
                reason: DeclineReason::StashEmpty,
                ..
            })
        ));
        gateway.audit();
    }

    #[tokio::test]
    async fn test_empty_stash_skips_judge() {
        let (mut ledger, ids) = ledger(2);
        let mut gateway = DonationGateway::new(0);
        let judge = ScriptedDonations::accepting();
        let mut rng = ChaCha12Rng::seed_from_u64(1);

        let round = gateway
            .resolve_pleas(pleas(&ids), &judge, TIMEOUT, 5, &mut ledger, &mut rng)
            .await;

        assert_eq!(judge.calls(), 0);
        assert_eq!(round.donated, 0);
    }

    #[tokio::test]
    async fn test_declined_pleas_keep_stash() {
        let (mut ledger, ids) = ledger(2);
        let mut gateway = DonationGateway::new(10);
        let judge = ScriptedDonations::declining();
        let mut rng = ChaCha12Rng::seed_from_u64(1);

        gateway
            .resolve_pleas(pleas(&ids), &judge, TIMEOUT, 5, &mut ledger, &mut rng)
            .await;

        assert_eq!(judge.calls(), 2);
        assert_eq!(gateway.stash(), 10);
    }

    #[test]
    fn test_replenish_accumulates() {
        let mut gateway = DonationGateway::new(2);
        assert!(gateway.replenish(0).is_none());
        gateway.replenish(3);

        assert_eq!(gateway.stash(), 5);
        assert_eq!(gateway.total_replenished(), 5);
        gateway.audit();
    }
}
