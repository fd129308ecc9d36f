//! Registry of exportable tables
//!
//! Each table is produced by exactly one indexer task, and a task usually
//! produces several tables. The registry is built once at startup and passed
//! by reference to everything that needs a lookup; it is never mutated
//! afterwards.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::error::{ExportError, Result};

/// Static description of an exportable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: &'static str,

    /// Indexer task that writes the table
    pub task: &'static str,

    /// Major schema version the table belongs to
    pub schema: u32,

    /// Row type produced by the indexer, kept only as a shape marker
    pub model: &'static str,
}

const fn table(name: &'static str, schema: u32, task: &'static str, model: &'static str) -> Table {
    Table {
        name,
        task,
        schema,
        model,
    }
}

/// Tables known to schema version 1, in export order
pub const BUILTIN_TABLES: &[Table] = &[
    table("actor_states", 1, "actorstatesraw", "ActorState"),
    table("actors", 1, "actorstatesraw", "Actor"),
    table("block_headers", 1, "blocks", "BlockHeader"),
    table("block_messages", 1, "messages", "BlockMessage"),
    table("block_parents", 1, "blocks", "BlockParent"),
    table("chain_consensus", 1, "consensus", "ChainConsensus"),
    table("chain_economics", 1, "chaineconomics", "ChainEconomics"),
    table("chain_powers", 1, "actorstatespower", "ChainPower"),
    table("chain_rewards", 1, "actorstatesreward", "ChainReward"),
    table("derived_gas_outputs", 1, "messages", "GasOutputs"),
    table("drand_block_entries", 1, "blocks", "DrandBlockEntry"),
    table("id_addresses", 1, "actorstatesinit", "IdAddress"),
    table("internal_messages", 1, "implicitmessage", "InternalMessage"),
    table("internal_parsed_messages", 1, "implicitmessage", "InternalParsedMessage"),
    table("market_deal_proposals", 1, "actorstatesmarket", "MarketDealProposal"),
    table("market_deal_states", 1, "actorstatesmarket", "MarketDealState"),
    table("message_gas_economy", 1, "messages", "MessageGasEconomy"),
    table("messages", 1, "messages", "Message"),
    table("miner_current_deadline_infos", 1, "actorstatesminer", "MinerCurrentDeadlineInfo"),
    table("miner_fee_debts", 1, "actorstatesminer", "MinerFeeDebt"),
    table("miner_infos", 1, "actorstatesminer", "MinerInfo"),
    table("miner_locked_funds", 1, "actorstatesminer", "MinerLockedFund"),
    table("miner_pre_commit_infos", 1, "actorstatesminer", "MinerPreCommitInfo"),
    table("miner_sector_deals", 1, "actorstatesminer", "MinerSectorDeal"),
    table("miner_sector_events", 1, "actorstatesminer", "MinerSectorEvent"),
    // actors v7 onwards
    table("miner_sector_infos_v7", 1, "actorstatesminer", "MinerSectorInfo"),
    // actors v6 and below
    table("miner_sector_infos", 1, "actorstatesminer", "MinerSectorInfoV1_4"),
    table("miner_sector_posts", 1, "actorstatesminer", "MinerSectorPost"),
    table("multisig_approvals", 1, "msapprovals", "MultisigApproval"),
    table("multisig_transactions", 1, "actorstatesmultisig", "MultisigTransaction"),
    table("parsed_messages", 1, "messages", "ParsedMessage"),
    table("power_actor_claims", 1, "actorstatespower", "PowerActorClaim"),
    table("receipts", 1, "messages", "Receipt"),
    table("verified_registry_verifiers", 1, "actorstatesverifreg", "VerifiedRegistryVerifier"),
    table(
        "verified_registry_verified_clients",
        1,
        "actorstatesverifreg",
        "VerifiedRegistryVerifiedClient",
    ),
];

/// Read-only lookup over a list of tables
#[derive(Debug, Clone)]
pub struct TableCatalog {
    tables: Vec<Table>,
    by_name: HashMap<&'static str, usize>,
}

impl TableCatalog {
    /// Build a catalog; declaration order is preserved for every listing.
    /// A repeated name keeps its first declaration.
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Self {
        let mut catalog = Self {
            tables: Vec::new(),
            by_name: HashMap::new(),
        };
        for t in tables {
            if catalog.by_name.contains_key(t.name) {
                continue;
            }
            catalog.by_name.insert(t.name, catalog.tables.len());
            catalog.tables.push(t);
        }
        catalog
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_TABLES.iter().copied())
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn tables_for_schema(&self, schema: u32) -> impl Iterator<Item = &Table> + '_ {
        self.tables.iter().filter(move |t| t.schema == schema)
    }

    pub fn tables_for_task<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables.iter().filter(move |t| t.task == task)
    }

    pub fn is_known_task(&self, task: &str) -> bool {
        self.tables.iter().any(|t| t.task == task)
    }

    pub fn known_tasks(&self) -> BTreeSet<&'static str> {
        self.tables.iter().map(|t| t.task).collect()
    }

    /// Resolve table names against a schema version.
    ///
    /// An empty list selects every table in the schema.
    pub fn resolve(&self, schema: u32, names: &[String]) -> Result<Vec<Table>> {
        if names.is_empty() {
            return Ok(self.tables_for_schema(schema).copied().collect());
        }

        names
            .iter()
            .map(|name| {
                self.get(name)
                    .filter(|t| t.schema == schema)
                    .copied()
                    .ok_or_else(|| ExportError::UnknownTable {
                        name: name.clone(),
                        schema,
                    })
            })
            .collect()
    }
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
