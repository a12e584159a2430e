use crate::*;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub ballots: u32,
    pub questions: usize,
    pub proofs: usize,
}

/// Re-check a completed election from its public data.
///
/// Recomputes the coins and every combined commitment, checks each combined
/// opening against its published counts, and verifies every completed proof.
/// Secret key parts are never used.
#[instrument(level = "info", skip(store))]
pub fn audit(store: &dyn Store, id: Uuid, batch_size: u32) -> Result<AuditReport, Error> {
    let election = store.get_election(id)?;
    if election.state != ElectionState::Completed {
        return Err(Error::WrongElectionState(
            id,
            election.state,
            ElectionState::Completed,
        ));
    }

    let mut bits = Vec::with_capacity(election.ballots_cnt as usize);
    for serials in batches(election.serials(), batch_size) {
        bits.extend(store.ballots(id, serials)?.iter().map(|b| b.b.is_voted()));
    }
    let coins = Coins::from_bitmap(bits);
    if election.coins.as_ref() != Some(&coins) {
        return Err(Error::MalformedMessage(
            "published coins do not match the cast ballots".to_owned(),
        ));
    }

    let mut proofs = 0;
    for question in &election.questions {
        let q = question.index;
        let key = question.key.public_only();

        let (combined_com, combined_decom, counts) = match (
            &question.combined_com,
            &question.combined_decom,
            &question.counts,
        ) {
            (Some(com), Some(decom), Some(counts)) => (com, decom, counts),
            _ => return Err(Error::TallyVerificationFailed(q)),
        };

        let mut voted = Vec::new();
        for serials in batches(election.serials(), batch_size) {
            for ballot in store.ballots(id, serials)? {
                for (side, part) in ballot.parts() {
                    let cells = part.questions.get(q as usize).map(Vec::as_slice).unwrap_or(&[]);
                    for cell in cells {
                        let verified = cell
                            .zk2
                            .as_ref()
                            .map(|zk2| verify_zk(&key, coins.as_str(), &cell.com, &cell.zk1, zk2))
                            .unwrap_or(false);
                        if !verified {
                            return Err(Error::ProofVerificationFailed(ballot.serial, side, q));
                        }
                        proofs += 1;

                        if cell.voted {
                            voted.push(cell.com.clone());
                        }
                    }
                }
            }
        }

        if add_com(&voted) != *combined_com || !verify_com(&key, combined_com, combined_decom) {
            return Err(Error::TallyVerificationFailed(q));
        }
        if decode_tally(&combined_decom.message, key.ballots, question.options).as_ref() != Some(counts) {
            return Err(Error::TallyVerificationFailed(q));
        }
    }

    info!(proofs, "election verified");

    Ok(AuditReport {
        ballots: election.ballots_cnt,
        questions: election.questions.len(),
        proofs,
    })
}
