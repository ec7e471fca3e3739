// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Streak rules shared by the store implementations.
//!
//! Streak fields are computed once, when the stats row for a round is
//! created, from the most recent prior round row of the same
//! (user, token, contract). Later purchases in the same round only bump the
//! ticket count.

/// The fields of the most recent prior stats row that feed the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorStats {
    pub round_id: u32,
    pub is_consecutive: bool,
    pub consecutive_rounds: i32,
    pub total_wins: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakFields {
    pub is_consecutive: bool,
    pub consecutive_rounds: i32,
    pub total_wins: i32,
}

/// A round is consecutive when the user also played the immediately
/// preceding round. The chain length only grows while every link was itself
/// consecutive; one missed round resets it to zero.
pub fn streak_fields(prior: Option<&PriorStats>, round_id: u32) -> StreakFields {
    match prior {
        Some(prior) if round_id > 0 && prior.round_id == round_id - 1 => StreakFields {
            is_consecutive: true,
            consecutive_rounds: if prior.is_consecutive {
                prior.consecutive_rounds + 1
            } else {
                1
            },
            total_wins: prior.total_wins,
        },
        Some(prior) => StreakFields {
            is_consecutive: false,
            consecutive_rounds: 0,
            total_wins: prior.total_wins,
        },
        None => StreakFields {
            is_consecutive: false,
            consecutive_rounds: 0,
            total_wins: 0,
        },
    }
}
