//! Settlement bookkeeping shared by settlement and cancellation

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::money;
use crate::store::{StoreError, StoreTx};

/// What a settlement or cancellation did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementSummary {
    pub battle_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub bets_won: usize,
    pub bets_lost: usize,
    pub bets_refunded: usize,
    /// Credited to winners
    pub total_paid: Decimal,
    /// Credited back to refunded bettors
    pub total_refunded: Decimal,
}

impl SettlementSummary {
    pub fn new(battle_id: Uuid, winner_id: Option<Uuid>) -> Self {
        Self {
            battle_id,
            winner_id,
            ..Default::default()
        }
    }
}

/// Balance credits collected during one settlement, one entry per account
#[derive(Debug, Default)]
pub(crate) struct Credits {
    by_user: BTreeMap<Uuid, Decimal>,
}

impl Credits {
    pub fn add(&mut self, user_id: Uuid, amount: Decimal) {
        if amount.is_zero() {
            return;
        }
        *self.by_user.entry(user_id).or_insert(Decimal::ZERO) += amount;
    }

    /// Apply every credit through `tx`, in ascending user id order so that two
    /// settlements never lock the same accounts in opposite orders
    pub async fn apply(self, tx: &mut dyn StoreTx) -> Result<(), StoreError> {
        for (user_id, amount) in self.by_user {
            tx.adjust_balance(user_id, amount).await?;
        }
        Ok(())
    }
}

/// Split `losing_total` across winning stakes in proportion to each stake.
///
/// Shares are truncated and never add up to more than `losing_total`.
/// Returns `None` when the stakes sum to zero or a share cannot be computed.
pub(crate) fn split_losing_pool(stakes: &[Decimal], losing_total: Decimal) -> Option<Vec<Decimal>> {
    if losing_total.is_zero() {
        return Some(vec![Decimal::ZERO; stakes.len()]);
    }
    let winning_total = stakes
        .iter()
        .try_fold(Decimal::ZERO, |acc, stake| acc.checked_add(*stake))?;

    let mut remaining = losing_total;
    let mut shares = Vec::with_capacity(stakes.len());
    for stake in stakes {
        let share = money::pro_rata(*stake, losing_total, winning_total)?.min(remaining);
        remaining -= share;
        shares.push(share);
    }
    Some(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use proptest::prelude::*;
    use crate::store::{BettingStore, MemoryStore};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_credits_aggregate_per_user() {
        let store = MemoryStore::new();
        let alice = User::new("0xa11ce", dec!(0));
        let bob = User::new("0xb0b", dec!(5));
        let (alice_id, bob_id) = (alice.id, bob.id);
        store.add_user(alice).await;
        store.add_user(bob).await;

        let mut credits = Credits::default();
        credits.add(alice_id, dec!(10));
        credits.add(bob_id, dec!(1.5));
        credits.add(alice_id, dec!(2.25));
        credits.add(bob_id, Decimal::ZERO);

        let mut tx = store.begin().await.unwrap();
        credits.apply(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.user(alice_id).await.unwrap().balance, dec!(12.25));
        assert_eq!(store.user(bob_id).await.unwrap().balance, dec!(6.5));
    }

    #[test]
    fn test_split_losing_pool() {
        let shares = split_losing_pool(&[dec!(30), dec!(70)], dec!(75)).unwrap();
        assert_eq!(shares, vec![dec!(22.5), dec!(52.5)]);

        let shares = split_losing_pool(&[dec!(10)], Decimal::ZERO).unwrap();
        assert_eq!(shares, vec![Decimal::ZERO]);

        assert!(split_losing_pool(&[Decimal::ZERO], dec!(5)).is_none());
    }

    #[test]
    fn test_split_losing_pool_with_large_stakes() {
        let shares = split_losing_pool(&[dec!(1000000000000000)], dec!(100000000000000)).unwrap();
        assert_eq!(shares, vec![dec!(100000000000000)]);
    }

    /// Net stakes from a thousandth of a unit up to about 9e18
    fn stake() -> impl Strategy<Value = Decimal> {
        (1i64..i64::MAX, 0u32..4u32).prop_map(|(m, scale)| Decimal::new(m, scale))
    }

    proptest! {
        #[test]
        fn split_never_exceeds_losing_pool(
            stakes in prop::collection::vec(stake(), 1..8),
            losing_total in stake(),
        ) {
            let shares = split_losing_pool(&stakes, losing_total).unwrap();
            let paid: Decimal = shares.iter().sum();

            prop_assert!(paid <= losing_total, "paid {} of {}", paid, losing_total);
            // truncation and division precision only
            let n = Decimal::from(stakes.len());
            let dust = n * (Decimal::new(1, 18) + losing_total * Decimal::new(1, 25));
            prop_assert!(
                losing_total - paid <= dust,
                "paid {} of {}",
                paid,
                losing_total
            );
            prop_assert!(shares.iter().all(|s| *s >= Decimal::ZERO));
        }
    }
}
