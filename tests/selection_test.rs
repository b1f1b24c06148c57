//! Distribution checks for priority tier sampling.

use markup_rs::selection::choose_tier;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

fn draw(seed: u64, priorities: &[i32], rounds: usize) -> HashMap<i32, usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = HashMap::new();
    for _ in 0..rounds {
        let tier = choose_tier(&mut rng, priorities).unwrap();
        *counts.entry(tier).or_insert(0) += 1;
    }
    counts
}

#[test]
fn high_priority_is_drawn_about_ten_times_as_often() {
    let counts = draw(0x5eed, &[10, 1], 11_000);
    let high = counts[&10] as f64;
    let low = counts[&1] as f64;

    // Expected 10_000 vs 1_000; binomial sd of the low count is about 30.
    assert!((850.0..=1150.0).contains(&low), "low tier drawn {low} times");
    let ratio = high / low;
    assert!((8.0..=12.5).contains(&ratio), "ratio {ratio}");
}

#[test]
fn low_priority_is_never_starved() {
    for seed in 0..20 {
        let counts = draw(seed, &[10, 10, 1], 2_000);
        assert!(counts.get(&1).copied().unwrap_or(0) > 0, "seed {seed}");
    }
}

#[test]
fn close_weights_split_proportionally() {
    // 5 / (5 + 4) of draws.
    let counts = draw(7, &[5, 4], 9_000);
    let five = counts[&5] as f64;
    let four = counts[&4] as f64;
    let share = five / (five + four);
    assert!((0.52..=0.59).contains(&share), "share {share}");
}

#[test]
fn nothing_to_choose_from() {
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(choose_tier(&mut rng, &[]), None);
    assert_eq!(choose_tier(&mut rng, &[0, -3]), None);
}

#[test]
fn single_tier_always_wins() {
    let counts = draw(3, &[4], 100);
    assert_eq!(counts[&4], 100);
}
