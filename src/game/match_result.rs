//! Round result and ranking
//!
//! Snapshots the final per-participant totals of a round into a ranked table.

use serde::{Deserialize, Serialize};

use crate::lobby::player::{ParticipantId, ParticipantScore};

/// Final standings of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_number: u32,
    pub winner_id: Option<ParticipantId>,
    pub rankings: Vec<ParticipantRanking>,
    pub total_hits: u32,
}

/// One participant's line in the round result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRanking {
    pub participant_id: ParticipantId,
    pub rank: u32,
    pub score: u32,
    pub hits: u32,
}

/// Rank participants by score (desc), then hits (desc), then id for stability
pub fn determine_result<'a>(
    round_number: u32,
    scores: impl IntoIterator<Item = (ParticipantId, &'a ParticipantScore)>,
) -> RoundResult {
    let mut rankings: Vec<ParticipantRanking> = scores
        .into_iter()
        .map(|(participant_id, score)| ParticipantRanking {
            participant_id,
            rank: 0,
            score: score.total_score,
            hits: score.total_hits,
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.hits.cmp(&a.hits))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    for (i, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = (i + 1) as u32;
    }

    let total_hits = rankings.iter().map(|r| r.hits).sum();

    // Nobody wins a round where nobody scored
    let winner_id = rankings
        .first()
        .filter(|first| first.score > 0)
        .map(|first| first.participant_id);

    RoundResult {
        round_number,
        winner_id,
        rankings,
        total_hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Species;
    use uuid::Uuid;

    fn score(hits: &[Species]) -> ParticipantScore {
        let mut score = ParticipantScore::new();
        for (i, species) in hits.iter().enumerate() {
            score.record(*species, species.points(), i as u64);
        }
        score
    }

    #[test]
    fn test_ranking_by_score() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sa = score(&[Species::Bee, Species::Bee]);
        let sb = score(&[Species::Legendary]);

        let result = determine_result(1, [(a, &sa), (b, &sb)]);
        assert_eq!(result.winner_id, Some(b));
        assert_eq!(result.rankings[0].participant_id, b);
        assert_eq!(result.rankings[0].rank, 1);
        assert_eq!(result.rankings[1].rank, 2);
        assert_eq!(result.total_hits, 3);
    }

    #[test]
    fn test_tie_broken_by_hits() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        // 50 points each: one bluebird vs five bees
        let sa = score(&[Species::Bluebird]);
        let sb = score(&[Species::Bee; 5]);

        let result = determine_result(2, [(a, &sa), (b, &sb)]);
        assert_eq!(result.rankings[0].participant_id, b);
    }

    #[test]
    fn test_no_winner_when_nobody_scored() {
        let a = Uuid::new_v4();
        let empty = ParticipantScore::new();
        let result = determine_result(1, [(a, &empty)]);
        assert!(result.winner_id.is_none());
        assert_eq!(result.rankings.len(), 1);
    }

    #[test]
    fn test_empty_room() {
        let result = determine_result(3, std::iter::empty());
        assert_eq!(result.round_number, 3);
        assert!(result.rankings.is_empty());
        assert!(result.winner_id.is_none());
    }
}
