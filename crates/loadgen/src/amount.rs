//! Amount strategies: how much each send moves

use parking_lot::Mutex;
use rand::Rng;

/// Decides the amount of the next transfer from an entry.
///
/// `spendable` is what the entry holds once the fee is set aside. Returning
/// 0 or more than that makes the generator skip the send.
pub trait AmountStrategy: Send + Sync {
    fn amount(&self, spendable: u64) -> u64;
}

/// Uniformly random amount strictly between 0 and `spendable`.
///
/// With a single unit left there is no such value, so the unit is sent
/// whole and keeps circulating through the beneficiary.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAmount;

impl AmountStrategy for RandomAmount {
    fn amount(&self, spendable: u64) -> u64 {
        match spendable {
            0 => 0,
            1 => 1,
            n => rand::thread_rng().gen_range(1..n),
        }
    }
}

/// Always one unit
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitAmount;

impl AmountStrategy for UnitAmount {
    fn amount(&self, spendable: u64) -> u64 {
        spendable.min(1)
    }
}

/// Everything that is left
#[derive(Debug, Default, Clone, Copy)]
pub struct FullAmount;

impl AmountStrategy for FullAmount {
    fn amount(&self, spendable: u64) -> u64 {
        spendable
    }
}

/// Replays a fixed sequence of amounts, wrapping around.
///
/// Each value is capped at `spendable`.
#[derive(Debug)]
pub struct ScriptedAmount {
    amounts: Vec<u64>,
    cursor: Mutex<usize>,
}

impl ScriptedAmount {
    pub fn new(amounts: Vec<u64>) -> Self {
        Self {
            amounts,
            cursor: Mutex::new(0),
        }
    }
}

impl AmountStrategy for ScriptedAmount {
    fn amount(&self, spendable: u64) -> u64 {
        if self.amounts.is_empty() {
            return 0;
        }
        let mut cursor = self.cursor.lock();
        let amount = self.amounts[*cursor % self.amounts.len()];
        *cursor += 1;
        amount.min(spendable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_strictly_inside() {
        let strategy = RandomAmount;
        for spendable in [2u64, 3, 10, 1_000] {
            for _ in 0..200 {
                let amount = strategy.amount(spendable);
                assert!(amount > 0 && amount < spendable);
            }
        }
        assert_eq!(strategy.amount(1), 1);
        assert_eq!(strategy.amount(0), 0);
    }

    #[test]
    fn test_unit_and_full() {
        assert_eq!(UnitAmount.amount(50), 1);
        assert_eq!(UnitAmount.amount(0), 0);
        assert_eq!(FullAmount.amount(50), 50);
    }

    #[test]
    fn test_scripted_wraps_and_caps() {
        let strategy = ScriptedAmount::new(vec![5, 20]);
        assert_eq!(strategy.amount(100), 5);
        assert_eq!(strategy.amount(100), 20);
        assert_eq!(strategy.amount(100), 5);
        assert_eq!(strategy.amount(8), 8);
        assert_eq!(ScriptedAmount::new(Vec::new()).amount(10), 0);
    }
}
