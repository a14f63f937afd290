//! Level-up upgrade pool

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::player::UPGRADE_CHOICES;

/// Options offered on a single level-up
pub type UpgradeOptions = SmallVec<[UpgradeType; UPGRADE_CHOICES]>;

/// One level-up upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeType {
    /// damageMultiplier *= 1.01
    DamageUp,
    /// moveSpeedMultiplier += 0.1 (named for attack speed on the client, affects movement)
    AtkspeedUp,
    /// maxHp += 10 and heal 10
    MaxHpUp,
    /// Switch weapon to CONE
    WeaponCone,
    /// Switch weapon to ORBIT
    WeaponOrbit,
}

impl UpgradeType {
    pub const ALL: [UpgradeType; 5] = [
        UpgradeType::DamageUp,
        UpgradeType::AtkspeedUp,
        UpgradeType::MaxHpUp,
        UpgradeType::WeaponCone,
        UpgradeType::WeaponOrbit,
    ];

    /// Wire name, e.g. `"DAMAGE_UP"`
    pub fn name(self) -> &'static str {
        match self {
            UpgradeType::DamageUp => "DAMAGE_UP",
            UpgradeType::AtkspeedUp => "ATKSPEED_UP",
            UpgradeType::MaxHpUp => "MAX_HP_UP",
            UpgradeType::WeaponCone => "WEAPON_CONE",
            UpgradeType::WeaponOrbit => "WEAPON_ORBIT",
        }
    }

    /// Strict lookup by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.name() == name)
    }

    /// Decode a client-supplied name; anything unknown becomes `DAMAGE_UP`
    pub fn from_name_lenient(name: &str) -> Self {
        Self::from_name(name).unwrap_or(UpgradeType::DamageUp)
    }
}

impl std::fmt::Display for UpgradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Draw the level-up options uniformly at random, with replacement
pub fn generate_options<R: Rng + ?Sized>(rng: &mut R) -> UpgradeOptions {
    (0..UPGRADE_CHOICES)
        .map(|_| UpgradeType::ALL[rng.gen_range(0..UpgradeType::ALL.len())])
        .collect()
}
