//! The navigation mode table: 49 strategies for choosing the next domino.
//!
//! Indices 0-20 are the basic families (three-way, two-way, one-way fixed
//! priority orders, each closed by a uniform-random member). Indices 21-47
//! are the stateful families: rotators cycle through three permutations of
//! their base order, flip-flops strictly alternate between two directions.
//! Indices 27, 34, 41 and 48 are reserved.

use crate::vm::RuntimeError;

/// Direction relative to the way the instruction pointer exits a domino.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    Forward,
    Left,
    Right,
}

use Rel::{Forward, Left, Right};

const THREE_WAY: [[Rel; 3]; 6] = [
    [Forward, Left, Right],
    [Forward, Right, Left],
    [Left, Forward, Right],
    [Left, Right, Forward],
    [Right, Forward, Left],
    [Right, Left, Forward],
];

const TWO_WAY: [[Rel; 2]; 6] = [
    [Forward, Left],
    [Forward, Right],
    [Left, Forward],
    [Left, Right],
    [Right, Forward],
    [Right, Left],
];

const ONE_WAY: [Rel; 6] = [Forward, Left, Right, Forward, Left, Right];

const FLIP_FLOP: [[Rel; 2]; 6] = [
    [Forward, Left],
    [Forward, Right],
    [Left, Forward],
    [Left, Right],
    [Right, Forward],
    [Right, Left],
];

/// σ = {Forward→Left, Left→Right, Right→Forward}; σ³ is the identity, so a
/// rotator cycles through exactly three permutations of its base order.
fn rotate(dir: Rel, times: usize) -> Rel {
    let mut dir = dir;
    for _ in 0..times % 3 {
        dir = match dir {
            Forward => Left,
            Left => Right,
            Right => Forward,
        };
    }
    dir
}

fn random_member(rng: &mut fastrand::Rng) -> usize {
    // floor(f64 * 6) lands each member in one of six equal buckets of [0, 1)
    ((rng.f64() * 6.0) as usize).min(5)
}

/// One navigation strategy. Stateful variants carry their own cycle
/// position; `fresh` marks a mode just installed by `NAVM`, consumed on the
/// next consultation so the cycle restarts cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavMode {
    ThreeWay(usize),
    ThreeWayRandom,
    TwoWay(usize),
    TwoWayRandom,
    OneWay(usize),
    OneWayRandom,
    RotatorThree { member: usize, pos: usize, fresh: bool },
    RotatorTwo { member: usize, pos: usize, fresh: bool },
    RotatorOne { member: usize, pos: usize, fresh: bool },
    FlipFlop { member: usize, second: bool, fresh: bool },
}

impl NavMode {
    pub fn from_index(index: i32) -> Result<NavMode, RuntimeError> {
        let mode = match index {
            0..=5 => NavMode::ThreeWay(index as usize),
            6 => NavMode::ThreeWayRandom,
            7..=12 => NavMode::TwoWay(index as usize - 7),
            13 => NavMode::TwoWayRandom,
            14..=19 => NavMode::OneWay(index as usize - 14),
            20 => NavMode::OneWayRandom,
            21..=26 => NavMode::RotatorThree { member: index as usize - 21, pos: 0, fresh: true },
            28..=33 => NavMode::RotatorTwo { member: index as usize - 28, pos: 0, fresh: true },
            35..=40 => NavMode::RotatorOne { member: index as usize - 35, pos: 0, fresh: true },
            42..=47 => NavMode::FlipFlop { member: index as usize - 42, second: false, fresh: true },
            _ => return Err(RuntimeError::InvalidNavigationMode { index }),
        };
        Ok(mode)
    }

    /// Ordered preference over {forward, left, right} for one decision.
    /// Advances the cycle state of rotators and flip-flops.
    pub fn consult(&mut self, rng: &mut fastrand::Rng) -> Vec<Rel> {
        match self {
            NavMode::ThreeWay(k) => THREE_WAY[*k].to_vec(),
            NavMode::ThreeWayRandom => THREE_WAY[random_member(rng)].to_vec(),
            NavMode::TwoWay(k) => TWO_WAY[*k].to_vec(),
            NavMode::TwoWayRandom => TWO_WAY[random_member(rng)].to_vec(),
            NavMode::OneWay(k) => vec![ONE_WAY[*k]],
            NavMode::OneWayRandom => vec![ONE_WAY[random_member(rng)]],
            NavMode::RotatorThree { member, pos, fresh } => {
                if *fresh {
                    *pos = 0;
                    *fresh = false;
                }
                let order = THREE_WAY[*member].map(|d| rotate(d, *pos));
                *pos = (*pos + 1) % 3;
                order.to_vec()
            }
            NavMode::RotatorTwo { member, pos, fresh } => {
                if *fresh {
                    *pos = 0;
                    *fresh = false;
                }
                let order = TWO_WAY[*member].map(|d| rotate(d, *pos));
                *pos = (*pos + 1) % 3;
                order.to_vec()
            }
            NavMode::RotatorOne { member, pos, fresh } => {
                if *fresh {
                    *pos = 0;
                    *fresh = false;
                }
                let dir = rotate(ONE_WAY[*member], *pos);
                *pos = (*pos + 1) % 3;
                vec![dir]
            }
            NavMode::FlipFlop { member, second, fresh } => {
                if *fresh {
                    *second = false;
                    *fresh = false;
                }
                let dir = FLIP_FLOP[*member][*second as usize];
                *second = !*second;
                vec![dir]
            }
        }
    }
}

impl Default for NavMode {
    fn default() -> NavMode {
        NavMode::ThreeWay(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> fastrand::Rng {
        fastrand::Rng::with_seed(0x5eed)
    }

    #[test]
    fn basic_three_way_orders() {
        let mut r = rng();
        assert_eq!(NavMode::from_index(0).unwrap().consult(&mut r), vec![Forward, Left, Right]);
        assert_eq!(NavMode::from_index(3).unwrap().consult(&mut r), vec![Left, Right, Forward]);
        assert_eq!(NavMode::from_index(5).unwrap().consult(&mut r), vec![Right, Left, Forward]);
    }

    #[test]
    fn basic_two_and_one_way_orders() {
        let mut r = rng();
        assert_eq!(NavMode::from_index(7).unwrap().consult(&mut r), vec![Forward, Left]);
        assert_eq!(NavMode::from_index(12).unwrap().consult(&mut r), vec![Right, Left]);
        assert_eq!(NavMode::from_index(15).unwrap().consult(&mut r), vec![Left]);
        assert_eq!(NavMode::from_index(19).unwrap().consult(&mut r), vec![Right]);
    }

    #[test]
    fn fixed_modes_are_deterministic() {
        let mut r = rng();
        let mut mode = NavMode::from_index(2).unwrap();
        let first = mode.consult(&mut r);
        for _ in 0..10 {
            assert_eq!(mode.consult(&mut r), first);
        }
    }

    #[test]
    fn random_member_picks_within_family() {
        let mut r = rng();
        let mut mode = NavMode::from_index(6).unwrap();
        for _ in 0..100 {
            let order = mode.consult(&mut r);
            assert!(THREE_WAY.iter().any(|o| o.as_slice() == order.as_slice()));
        }
    }

    #[test]
    fn random_member_is_reproducible_by_seed() {
        let mut a = fastrand::Rng::with_seed(42);
        let mut b = fastrand::Rng::with_seed(42);
        let mut ma = NavMode::from_index(13).unwrap();
        let mut mb = NavMode::from_index(13).unwrap();
        for _ in 0..50 {
            assert_eq!(ma.consult(&mut a), mb.consult(&mut b));
        }
    }

    #[test]
    fn rotator_cycles_through_three_permutations() {
        let mut r = rng();
        // member 0 of the rotator three-way family starts from FLR
        let mut mode = NavMode::from_index(21).unwrap();
        assert_eq!(mode.consult(&mut r), vec![Forward, Left, Right]);
        assert_eq!(mode.consult(&mut r), vec![Left, Right, Forward]);
        assert_eq!(mode.consult(&mut r), vec![Right, Forward, Left]);
        assert_eq!(mode.consult(&mut r), vec![Forward, Left, Right]);
    }

    #[test]
    fn rotator_one_way_cycles_directions() {
        let mut r = rng();
        let mut mode = NavMode::from_index(35).unwrap();
        assert_eq!(mode.consult(&mut r), vec![Forward]);
        assert_eq!(mode.consult(&mut r), vec![Left]);
        assert_eq!(mode.consult(&mut r), vec![Right]);
        assert_eq!(mode.consult(&mut r), vec![Forward]);
    }

    #[test]
    fn flip_flop_alternates() {
        let mut r = rng();
        let mut mode = NavMode::from_index(44).unwrap();
        assert_eq!(mode.consult(&mut r), vec![Left]);
        assert_eq!(mode.consult(&mut r), vec![Forward]);
        assert_eq!(mode.consult(&mut r), vec![Left]);
        assert_eq!(mode.consult(&mut r), vec![Forward]);
    }

    #[test]
    fn reselecting_restarts_stateful_modes() {
        let mut r = rng();
        let mut mode = NavMode::from_index(21).unwrap();
        mode.consult(&mut r);
        mode.consult(&mut r);
        // NAVM installs a fresh value, which restarts the cycle
        mode = NavMode::from_index(21).unwrap();
        assert_eq!(mode.consult(&mut r), vec![Forward, Left, Right]);
    }

    #[test]
    fn reserved_indices_are_rejected() {
        for index in [27, 34, 41, 48, -1, 49, 100] {
            assert!(matches!(
                NavMode::from_index(index),
                Err(RuntimeError::InvalidNavigationMode { .. })
            ));
        }
    }
}
