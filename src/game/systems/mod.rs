pub mod physics;
pub mod attack;
pub mod ai;
pub mod combat;
pub mod waves;
pub mod snapshot;

/// One attack landing on one target, before the combat resolver applies it.
///
/// For player attacks `attacker` is a player id and `target` an enemy id;
/// for enemy attacks it is the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub attacker: i64,
    pub target: i64,
    pub damage: i32,
}

impl Hit {
    #[inline]
    pub fn new(attacker: i64, target: i64, damage: i32) -> Self {
        Self { attacker, target, damage }
    }
}
