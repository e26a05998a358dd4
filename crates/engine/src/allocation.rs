//! Split allocator.
//!
//! [`allocate`] partitions a positive amount across an ordered participant
//! list according to a [`SplitPolicy`]. It is pure and synchronous.
//!
//! Reconciliation guarantees differ by policy:
//!
//! - `Equal` and `Exact` always produce splits that sum to the amount exactly.
//! - `Percentage` and `Shares` round each share independently (half-up) and
//!   may drift from the amount by up to one cent per participant. No
//!   reconciliation is applied here; the ledger refuses to record an expense
//!   whose splits do not reconcile.
//!
//! For `Equal`, the whole rounding remainder goes to the **first**
//! participant (`$10.00 / 3 = [3.34, 3.33, 3.33]`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, Percent, ResultEngine, Split};

/// Parameter sums must land strictly closer than this to their target
/// (0.01 currency units for `Exact`).
const EXACT_TOLERANCE_CENTS: i64 = 1;

/// 0.01 percentage points expressed in [`Percent`] units.
const PERCENT_TOLERANCE_UNITS: i64 = Percent::SCALE / 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    Equal,
    Percentage,
    Exact,
    Shares,
}

impl SplitType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Percentage => "percentage",
            Self::Exact => "exact",
            Self::Shares => "shares",
        }
    }
}

impl TryFrom<&str> for SplitType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "percentage" => Ok(Self::Percentage),
            "exact" => Ok(Self::Exact),
            "shares" => Ok(Self::Shares),
            other => Err(EngineError::InvalidSplitParams(format!(
                "invalid split type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SplitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A split type together with its per-participant parameters.
///
/// Parameter vectors are positional: entry `i` belongs to participant `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum SplitPolicy {
    Equal,
    Percentage(Vec<Percent>),
    Exact(Vec<MoneyCents>),
    Shares(Vec<u32>),
}

impl SplitPolicy {
    #[must_use]
    pub fn split_type(&self) -> SplitType {
        match self {
            Self::Equal => SplitType::Equal,
            Self::Percentage(_) => SplitType::Percentage,
            Self::Exact(_) => SplitType::Exact,
            Self::Shares(_) => SplitType::Shares,
        }
    }

    /// Builds a policy from raw user input (one string per participant).
    ///
    /// `Equal` ignores `values`.
    pub fn from_input(split_type: SplitType, values: &[&str]) -> ResultEngine<Self> {
        let invalid = |kind: &str, raw: &str| {
            EngineError::InvalidSplitParams(format!("invalid {kind} value: {raw}"))
        };
        match split_type {
            SplitType::Equal => Ok(Self::Equal),
            SplitType::Percentage => values
                .iter()
                .map(|raw| raw.parse::<Percent>().map_err(|_| invalid("percentage", raw)))
                .collect::<ResultEngine<Vec<_>>>()
                .map(Self::Percentage),
            SplitType::Exact => values
                .iter()
                .map(|raw| raw.parse::<MoneyCents>().map_err(|_| invalid("amount", raw)))
                .collect::<ResultEngine<Vec<_>>>()
                .map(Self::Exact),
            SplitType::Shares => values
                .iter()
                .map(|raw| raw.trim().parse::<u32>().map_err(|_| invalid("share", raw)))
                .collect::<ResultEngine<Vec<_>>>()
                .map(Self::Shares),
        }
    }
}

/// Partitions `amount` across `participants`.
///
/// Fails with [`EngineError::InvalidSplitParams`] when:
/// - `amount <= 0`
/// - `participants` is empty or contains duplicates
/// - `payer` is not a participant
/// - the policy parameters are missing, malformed or do not add up
pub fn allocate(
    amount: MoneyCents,
    policy: &SplitPolicy,
    participants: &[Uuid],
    payer: Uuid,
) -> ResultEngine<Vec<Split>> {
    validate_participants(amount, participants, payer)?;

    let shares = match policy {
        SplitPolicy::Equal => equal_shares(amount, participants.len()),
        SplitPolicy::Percentage(percentages) => {
            ensure_param_count(percentages.len(), participants.len(), "percentage")?;
            percentage_shares(amount, percentages)?
        }
        SplitPolicy::Exact(amounts) => {
            ensure_param_count(amounts.len(), participants.len(), "exact amount")?;
            exact_shares(amount, amounts)?
        }
        SplitPolicy::Shares(weights) => {
            ensure_param_count(weights.len(), participants.len(), "share")?;
            weighted_shares(amount, weights)?
        }
    };

    Ok(participants
        .iter()
        .zip(shares)
        .map(|(member_id, share)| Split::new(*member_id, share, *member_id == payer))
        .collect())
}

fn validate_participants(amount: MoneyCents, participants: &[Uuid], payer: Uuid) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidSplitParams(
            "amount must be > 0".to_string(),
        ));
    }
    if participants.is_empty() {
        return Err(EngineError::InvalidSplitParams(
            "at least one participant is required".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(participants.len());
    for id in participants {
        if !seen.insert(id) {
            return Err(EngineError::InvalidSplitParams(format!(
                "duplicate participant: {id}"
            )));
        }
    }
    if !seen.contains(&payer) {
        return Err(EngineError::InvalidSplitParams(
            "payer must be one of the participants".to_string(),
        ));
    }
    Ok(())
}

fn ensure_param_count(got: usize, expected: usize, label: &str) -> ResultEngine<()> {
    if got != expected {
        return Err(EngineError::InvalidSplitParams(format!(
            "expected {expected} {label} values, got {got}"
        )));
    }
    Ok(())
}

fn equal_shares(amount: MoneyCents, count: usize) -> Vec<MoneyCents> {
    let count = count as i64;
    let share = amount.cents() / count;
    let remainder = amount.cents() - share * count;

    let mut shares = vec![MoneyCents::new(share); count as usize];
    if let Some(first) = shares.first_mut() {
        *first += MoneyCents::new(remainder);
    }
    shares
}

fn percentage_shares(amount: MoneyCents, percentages: &[Percent]) -> ResultEngine<Vec<MoneyCents>> {
    if let Some(p) = percentages.iter().find(|p| p.is_negative()) {
        return Err(EngineError::InvalidSplitParams(format!(
            "percentage must not be negative: {p}"
        )));
    }
    let total: i64 = percentages.iter().map(|p| p.units()).sum();
    if (total - Percent::HUNDRED.units()).abs() >= PERCENT_TOLERANCE_UNITS {
        return Err(EngineError::InvalidSplitParams(format!(
            "percentages must add up to 100, got {}",
            Percent::from_units(total)
        )));
    }

    let denominator = i128::from(Percent::HUNDRED.units());
    percentages
        .iter()
        .map(|p| {
            let numerator = i128::from(amount.cents()) * i128::from(p.units());
            cents_from_i128(round_half_up(numerator, denominator))
        })
        .collect()
}

fn exact_shares(amount: MoneyCents, amounts: &[MoneyCents]) -> ResultEngine<Vec<MoneyCents>> {
    if let Some(a) = amounts.iter().find(|a| a.is_negative()) {
        return Err(EngineError::InvalidSplitParams(format!(
            "exact amount must not be negative: {a}"
        )));
    }
    let total = amounts
        .iter()
        .try_fold(MoneyCents::ZERO, |acc, a| acc.checked_add(*a))
        .ok_or_else(|| EngineError::InvalidSplitParams("exact amounts overflow".to_string()))?;
    if (total - amount).cents().abs() >= EXACT_TOLERANCE_CENTS {
        return Err(EngineError::InvalidSplitParams(format!(
            "exact amounts must add up to the total: {total} != {amount}"
        )));
    }
    Ok(amounts.to_vec())
}

fn weighted_shares(amount: MoneyCents, weights: &[u32]) -> ResultEngine<Vec<MoneyCents>> {
    if weights.contains(&0) {
        return Err(EngineError::InvalidSplitParams(
            "shares must be > 0".to_string(),
        ));
    }
    let total: i128 = weights.iter().map(|w| i128::from(*w)).sum();
    weights
        .iter()
        .map(|w| {
            let numerator = i128::from(amount.cents()) * i128::from(*w);
            cents_from_i128(round_half_up(numerator, total))
        })
        .collect()
}

/// Rounds `numerator / denominator` to the nearest integer, ties away from
/// zero. `denominator` must be positive.
fn round_half_up(numerator: i128, denominator: i128) -> i128 {
    if numerator >= 0 {
        (2 * numerator + denominator) / (2 * denominator)
    } else {
        -((-2 * numerator + denominator) / (2 * denominator))
    }
}

fn cents_from_i128(value: i128) -> ResultEngine<MoneyCents> {
    i64::try_from(value)
        .map(MoneyCents::new)
        .map_err(|_| EngineError::InvalidSplitParams("share too large".to_string()))
}
