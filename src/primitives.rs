use std::fmt;

use crate::types::CommandKind;

// --- Commands ---------------------------------------------------------------

/// A decoded ledger command, as delivered to scripts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>, // Opaque to the dispatcher
    pub created_time: u64, // Ledger time (ms) of the enclosing transaction
}

impl Command {
    pub fn new(kind: CommandKind, payload: impl Into<Vec<u8>>, created_time: u64) -> Self {
        Command { kind, payload: payload.into(), created_time }
    }
}

/// Body of a command inside a transaction: the raw ledger code plus payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandBody {
    pub code: u32,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl CommandBody {
    pub fn new(kind: CommandKind, payload: impl Into<Vec<u8>>) -> Self {
        CommandBody { code: kind.code(), payload: payload.into() }
    }
}

/// A command as it arrives from the ledger, before its code is resolved
/// against the catalog. The code may be one this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawCommand {
    pub code: u32,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    pub created_time: u64,
}

impl RawCommand {
    /// Resolves the code. Unknown codes give `None`.
    pub fn resolve(self) -> Option<Command> {
        let kind = CommandKind::by_index(self.code)?;
        Some(Command { kind, payload: self.payload, created_time: self.created_time })
    }
}

impl From<Command> for RawCommand {
    fn from(cmd: Command) -> Self {
        RawCommand { code: cmd.kind.code(), payload: cmd.payload, created_time: cmd.created_time }
    }
}

// --- Transactions & Blocks --------------------------------------------------

/// A committed ledger transaction. Every command in it shares `created_time`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub creator_account_id: String,
    pub created_time: u64,
    pub commands: Vec<CommandBody>,
}

/// A committed ledger block.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub height: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Flattens the block into its commands: transaction order first, then
    /// command order within each transaction. Each command carries its
    /// transaction's `created_time`.
    pub fn raw_commands(&self) -> impl Iterator<Item = RawCommand> + '_ {
        self.transactions.iter().flat_map(|tx| {
            tx.commands.iter().map(move |body| RawCommand {
                code: body.code,
                payload: body.payload.clone(),
                created_time: tx.created_time,
            })
        })
    }

    pub fn command_count(&self) -> usize {
        self.transactions.iter().map(|tx| tx.commands.len()).sum()
    }
}

/// Signatures an outgoing transaction needs unless a script asks for more.
pub const DEFAULT_QUORUM: u32 = 1;

/// A transaction a script wants to send back to the ledger.
///
/// Unlike a committed [`Transaction`] it is built from catalog kinds only and
/// carries the signature quorum the ledger must collect. Signing happens
/// behind [`crate::script_traits::LedgerApi`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutgoingTransaction {
    pub creator_account_id: String,
    pub created_time: u64,
    pub quorum: u32,
    commands: Vec<CommandBody>,
}

impl OutgoingTransaction {
    pub fn new(creator_account_id: impl Into<String>, created_time: u64) -> Self {
        OutgoingTransaction {
            creator_account_id: creator_account_id.into(),
            created_time,
            quorum: DEFAULT_QUORUM,
            commands: Vec::new(),
        }
    }

    pub fn with_quorum(mut self, quorum: u32) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_command(mut self, kind: CommandKind, payload: impl Into<Vec<u8>>) -> Self {
        self.commands.push(CommandBody::new(kind, payload));
        self
    }

    pub fn commands(&self) -> &[CommandBody] {
        &self.commands
    }
}

// --- Keys -------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PublicKeyBytes(#[serde(with = "serde_bytes")] pub [u8; 32]);

/// Secret half of a key pair. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKeyBytes(pub [u8; 64]);

impl fmt::Debug for SecretKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyBytes(<redacted>)")
    }
}

/// The dApp's signing key pair. The host owns it; scripts get a shared,
/// read-only reference through their context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public: PublicKeyBytes,
    secret: SecretKeyBytes,
}

impl KeyPair {
    pub fn new(public: PublicKeyBytes, secret: SecretKeyBytes) -> Self {
        KeyPair { public, secret }
    }

    /// Raw secret bytes, for the signing collaborator only.
    pub fn secret(&self) -> &SecretKeyBytes {
        &self.secret
    }
}
