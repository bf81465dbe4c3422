//!
//! The command-kind catalog and the interest sets built on top of it.
//!
//! Codes are a wire contract with the ledger: they are fixed and must never be
//! renumbered. A code this catalog does not know is not an error, it simply
//! resolves to `None` (the ledger protocol may evolve faster than this table).

use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Category of a ledger command.
/// The discriminant is the ledger's numeric command code.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    AddAssetQuantity = 1,
    AddPeer = 2,
    AddSignatory = 3,
    AppendRole = 4,
    CreateAccount = 5,
    CreateAsset = 6,
    CreateDomain = 7,
    CreateRole = 8,
    DetachRole = 9,
    GrantPermission = 10,
    RemoveSignatory = 11,
    RevokePermission = 12,
    SetAccountDetail = 13,
    SetAccountQuorum = 14,
    SubtractAssetQuantity = 15,
    TransferAsset = 16,
}

impl CommandKind {
    /// Every kind, in code order.
    pub const ALL: [CommandKind; 16] = [
        CommandKind::AddAssetQuantity,
        CommandKind::AddPeer,
        CommandKind::AddSignatory,
        CommandKind::AppendRole,
        CommandKind::CreateAccount,
        CommandKind::CreateAsset,
        CommandKind::CreateDomain,
        CommandKind::CreateRole,
        CommandKind::DetachRole,
        CommandKind::GrantPermission,
        CommandKind::RemoveSignatory,
        CommandKind::RevokePermission,
        CommandKind::SetAccountDetail,
        CommandKind::SetAccountQuorum,
        CommandKind::SubtractAssetQuantity,
        CommandKind::TransferAsset,
    ];

    /// Looks up a kind by its ledger code.
    ///
    /// Returns `None` for any code outside the catalog; callers treat that as
    /// "matches nothing" rather than as a failure.
    pub fn by_index(code: u32) -> Option<CommandKind> {
        match code {
            1 => Some(CommandKind::AddAssetQuantity),
            2 => Some(CommandKind::AddPeer),
            3 => Some(CommandKind::AddSignatory),
            4 => Some(CommandKind::AppendRole),
            5 => Some(CommandKind::CreateAccount),
            6 => Some(CommandKind::CreateAsset),
            7 => Some(CommandKind::CreateDomain),
            8 => Some(CommandKind::CreateRole),
            9 => Some(CommandKind::DetachRole),
            10 => Some(CommandKind::GrantPermission),
            11 => Some(CommandKind::RemoveSignatory),
            12 => Some(CommandKind::RevokePermission),
            13 => Some(CommandKind::SetAccountDetail),
            14 => Some(CommandKind::SetAccountQuorum),
            15 => Some(CommandKind::SubtractAssetQuantity),
            16 => Some(CommandKind::TransferAsset),
            _ => None,
        }
    }

    /// The ledger code of this kind.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Canonical ledger name, e.g. `CREATE_ACCOUNT`.
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandKind::AddAssetQuantity => "ADD_ASSET_QUANTITY",
            CommandKind::AddPeer => "ADD_PEER",
            CommandKind::AddSignatory => "ADD_SIGNATORY",
            CommandKind::AppendRole => "APPEND_ROLE",
            CommandKind::CreateAccount => "CREATE_ACCOUNT",
            CommandKind::CreateAsset => "CREATE_ASSET",
            CommandKind::CreateDomain => "CREATE_DOMAIN",
            CommandKind::CreateRole => "CREATE_ROLE",
            CommandKind::DetachRole => "DETACH_ROLE",
            CommandKind::GrantPermission => "GRANT_PERMISSION",
            CommandKind::RemoveSignatory => "REMOVE_SIGNATORY",
            CommandKind::RevokePermission => "REVOKE_PERMISSION",
            CommandKind::SetAccountDetail => "SET_ACCOUNT_DETAIL",
            CommandKind::SetAccountQuorum => "SET_ACCOUNT_QUORUM",
            CommandKind::SubtractAssetQuantity => "SUBTRACT_ASSET_QUANTITY",
            CommandKind::TransferAsset => "TRANSFER_ASSET",
        }
    }

    // Bit position inside an InterestSet mask.
    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u32 - 1)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for CommandKind {
    type Error = CatalogError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        CommandKind::by_index(value).ok_or(CatalogError::UnknownCode(value))
    }
}

impl FromStr for CommandKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CommandKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CatalogError::UnknownName(wanted.to_string()))
    }
}

/// Immutable set of command kinds a script wants delivered.
///
/// Stored as a 16-bit mask, one bit per catalog code, so membership tests on
/// the dispatch hot path are a single AND.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct InterestSet(u32);

impl InterestSet {
    /// The empty set. A script declaring it is registered but never receives anything.
    pub const fn empty() -> Self {
        InterestSet(0)
    }

    /// Every catalog kind.
    pub fn all() -> Self {
        CommandKind::ALL.iter().copied().collect()
    }

    pub fn contains(&self, kind: CommandKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Kinds in the set, in code order.
    pub fn iter(&self) -> impl Iterator<Item = CommandKind> + '_ {
        CommandKind::ALL.iter().copied().filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<CommandKind> for InterestSet {
    fn from_iter<I: IntoIterator<Item = CommandKind>>(iter: I) -> Self {
        InterestSet(iter.into_iter().fold(0, |mask, kind| mask | kind.bit()))
    }
}

impl<const N: usize> From<[CommandKind; N]> for InterestSet {
    fn from(kinds: [CommandKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

impl fmt::Display for InterestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kind)?;
        }
        f.write_str("}")
    }
}
