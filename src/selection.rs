//! Priority tier sampling for work selection.
//!
//! Every tier with available work gets a chance proportional to its
//! priority value: tier 10 is drawn about ten times as often as tier 1, but
//! tier 1 is never starved while tier 10 still has work.

use rand::Rng;

/// Pick one priority from `priorities`, weighting each by its own value.
///
/// Non-positive priorities carry no weight. Returns `None` when nothing has
/// weight.
pub fn choose_tier<R: Rng + ?Sized>(rng: &mut R, priorities: &[i32]) -> Option<i32> {
    let total: i64 = priorities
        .iter()
        .filter(|&&p| p > 0)
        .map(|&p| i64::from(p))
        .sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.gen_range(0..total);
    for &p in priorities.iter().filter(|&&p| p > 0) {
        let weight = i64::from(p);
        if roll < weight {
            return Some(p);
        }
        roll -= weight;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn empty_input_has_no_tier() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_tier(&mut rng, &[]), None);
        assert_eq!(choose_tier(&mut rng, &[0, -3]), None);
    }

    #[test]
    fn single_tier_is_always_chosen() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            assert_eq!(choose_tier(&mut rng, &[4]), Some(4));
        }
    }

    #[test]
    fn only_offered_tiers_are_returned() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let t = choose_tier(&mut rng, &[2, 7, 9]).unwrap();
            assert!([2, 7, 9].contains(&t));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert_eq!(
                choose_tier(&mut a, &[1, 5, 10]),
                choose_tier(&mut b, &[1, 5, 10])
            );
        }
    }
}
