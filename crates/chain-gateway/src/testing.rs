//! In-memory ledger for tests
//!
//! [`FakeLedger`] implements [`ContractGateway`] over plain maps and simulates
//! just enough contract behaviour to exercise setkit end to end: ERC20
//! balances and allowances, Set issuance and redemption through a vault, the
//! rebalancing lifecycle and the manager two-phase propose. Clones share the
//! same state, so a test can keep a handle to move the clock or inspect
//! balances after handing a clone to a [`crate::ChainClient`].

use std::cmp::max;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use setkit_core::{
    constants::ONE_DAY, Address, GatewayConfig, GatewayError, Quantity, RebalanceState, Timestamp,
    TxHash,
};

use crate::gateway::{
    AssetPairManagerRecord, AuctionParameters, BiddingParameters, ContractCall, ContractGateway,
    GatewayResult, MacoManagerRecord, TxOptions,
};
use crate::ChainClient;

#[derive(Debug, Clone)]
struct TokenRecord {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Quantity,
}

#[derive(Debug, Clone)]
struct SetRecord {
    components: Vec<Address>,
    units: Vec<Quantity>,
    natural_unit: Quantity,
}

#[derive(Debug, Clone)]
struct CoreRecord {
    transfer_proxy: Address,
    vault: Address,
    valid_sets: HashSet<Address>,
}

#[derive(Debug, Clone)]
struct AssetPairState {
    record: AssetPairManagerRecord,
    recent_initial_propose: Timestamp,
    base_asset_allocation: Quantity,
    /// Set the allocator hands back on confirm
    allocator_next_set: Address,
}

/// On-chain fields of a simulated rebalancing Set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancingRecord {
    pub manager: Address,
    pub current_set: Address,
    pub next_set: Address,
    pub state: RebalanceState,
    pub last_rebalance_timestamp: Timestamp,
    pub rebalance_interval: Timestamp,
    pub proposal_period: Timestamp,
    pub proposal_start_time: Timestamp,
    pub auction_library: Address,
    pub auction: AuctionParameters,
    pub bidding: BiddingParameters,
    pub combined_token_array: Vec<Address>,
    pub combined_current_units: Vec<Quantity>,
    pub combined_next_units: Vec<Quantity>,
    pub unit_shares: Quantity,
    pub natural_unit: Quantity,
}

impl RebalancingRecord {
    /// A rebalancing Set in `Default` with one-day interval and proposal period
    pub fn new(manager: Address, current_set: Address, unit_shares: Quantity) -> Self {
        Self {
            manager,
            current_set,
            next_set: Address::zero(),
            state: RebalanceState::Default,
            last_rebalance_timestamp: 0,
            rebalance_interval: ONE_DAY,
            proposal_period: ONE_DAY,
            proposal_start_time: 0,
            auction_library: Address::zero(),
            auction: AuctionParameters {
                auction_start_time: 0,
                auction_time_to_pivot: 0,
                auction_start_price: Quantity::zero(),
                auction_pivot_price: Quantity::zero(),
            },
            bidding: BiddingParameters {
                minimum_bid: Quantity::zero(),
                remaining_current_sets: Quantity::zero(),
                starting_current_sets: Quantity::zero(),
            },
            combined_token_array: Vec::new(),
            combined_current_units: Vec::new(),
            combined_next_units: Vec::new(),
            unit_shares,
            natural_unit: Quantity::from(10u64).pow(Quantity::from(10u64)),
        }
    }
}

#[derive(Default)]
struct LedgerState {
    now: Timestamp,
    latency: Option<Duration>,
    read_failure: Option<String>,
    revert_next: Option<String>,
    tokens: HashMap<Address, TokenRecord>,
    balances: HashMap<(Address, Address), Quantity>,
    allowances: HashMap<(Address, Address, Address), Quantity>,
    sets: HashMap<Address, SetRecord>,
    rebalancing: HashMap<Address, RebalancingRecord>,
    cores: HashMap<Address, CoreRecord>,
    vault: HashMap<(Address, Address), Quantity>,
    curves: HashMap<Address, Quantity>,
    oracle_spot: HashMap<Address, Quantity>,
    oracle_period: HashMap<(Address, u64), Quantity>,
    macos: HashMap<Address, (MacoManagerRecord, Timestamp)>,
    asset_pairs: HashMap<Address, AssetPairState>,
    submitted: Vec<(ContractCall, TxOptions)>,
    tx_count: u64,
}

/// Shared in-memory ledger implementing [`ContractGateway`]
#[derive(Clone, Default)]
pub struct FakeLedger {
    state: Arc<Mutex<LedgerState>>,
}

fn no_contract(target: Address, what: &str) -> GatewayError {
    GatewayError::Reverted {
        target,
        reason: format!("no {} at address", what),
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`ChainClient`] backed by this ledger with the default configuration
    pub fn client(&self) -> ChainClient {
        ChainClient::new(Arc::new(self.clone()), GatewayConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A panicking test thread must not hide the ledger from the next assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply configured latency and read failures, then run `f` on the state
    async fn read<T>(&self, f: impl FnOnce(&LedgerState) -> GatewayResult<T>) -> GatewayResult<T> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let state = self.lock();
        if let Some(message) = &state.read_failure {
            return Err(GatewayError::Transport {
                message: message.clone(),
            });
        }
        f(&*state)
    }

    // Clock and fault injection

    pub fn now(&self) -> Timestamp {
        self.lock().now
    }

    pub fn set_time(&self, now: Timestamp) {
        self.lock().now = now;
    }

    pub fn advance(&self, secs: Timestamp) {
        self.lock().now += secs;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Every subsequent read fails with a transport error
    pub fn fail_reads(&self, message: &str) {
        self.lock().read_failure = Some(message.to_string());
    }

    /// The next transaction reverts with `reason`
    pub fn revert_next(&self, reason: &str) {
        self.lock().revert_next = Some(reason.to_string());
    }

    /// Every transaction submitted so far, in order
    pub fn submitted(&self) -> Vec<(ContractCall, TxOptions)> {
        self.lock().submitted.clone()
    }

    // Seeding

    pub fn add_token(&self, token: Address, symbol: &str, decimals: u8) {
        self.lock().tokens.insert(
            token,
            TokenRecord {
                name: format!("{} Token", symbol),
                symbol: symbol.to_string(),
                decimals,
                total_supply: Quantity::zero(),
            },
        );
    }

    pub fn mint(&self, token: Address, owner: Address, amount: Quantity) {
        let mut state = self.lock();
        mint_into(&mut state, token, owner, amount);
    }

    pub fn balance(&self, token: Address, owner: Address) -> Quantity {
        balance_of(&self.lock(), token, owner)
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: Quantity) {
        self.lock().allowances.insert((token, owner, spender), amount);
    }

    pub fn add_set(
        &self,
        set: Address,
        components: Vec<Address>,
        units: Vec<Quantity>,
        natural_unit: Quantity,
    ) {
        let mut state = self.lock();
        state.sets.insert(
            set,
            SetRecord {
                components,
                units,
                natural_unit,
            },
        );
        state.tokens.entry(set).or_insert_with(|| TokenRecord {
            name: "Set Token".to_string(),
            symbol: "SET".to_string(),
            decimals: 18,
            total_supply: Quantity::zero(),
        });
    }

    pub fn add_core(&self, core: Address, transfer_proxy: Address, vault: Address) {
        self.lock().cores.insert(
            core,
            CoreRecord {
                transfer_proxy,
                vault,
                valid_sets: HashSet::new(),
            },
        );
    }

    pub fn register_set(&self, core: Address, set: Address) {
        if let Some(record) = self.lock().cores.get_mut(&core) {
            record.valid_sets.insert(set);
        }
    }

    pub fn deposit_vault(&self, token: Address, owner: Address, amount: Quantity) {
        *self.lock().vault.entry((token, owner)).or_default() += amount;
    }

    pub fn vault_of(&self, token: Address, owner: Address) -> Quantity {
        self.lock()
            .vault
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    /// Register a rebalancing Set; it also answers the Set and ERC20 reads
    pub fn add_rebalancing_set(&self, address: Address, record: RebalancingRecord) {
        let mut state = self.lock();
        state.sets.insert(
            address,
            SetRecord {
                components: vec![record.current_set],
                units: vec![record.unit_shares],
                natural_unit: record.natural_unit,
            },
        );
        state.tokens.entry(address).or_insert_with(|| TokenRecord {
            name: "Rebalancing Set Token".to_string(),
            symbol: "RBSET".to_string(),
            decimals: 18,
            total_supply: Quantity::zero(),
        });
        state.rebalancing.insert(address, record);
    }

    pub fn rebalancing(&self, address: Address) -> Option<RebalancingRecord> {
        self.lock().rebalancing.get(&address).cloned()
    }

    pub fn update_rebalancing(&self, address: Address, f: impl FnOnce(&mut RebalancingRecord)) {
        if let Some(record) = self.lock().rebalancing.get_mut(&address) {
            f(record);
        }
    }

    pub fn add_price_curve(&self, curve: Address, price_divisor: Quantity) {
        self.lock().curves.insert(curve, price_divisor);
    }

    pub fn set_oracle_price(&self, oracle: Address, price: Quantity) {
        self.lock().oracle_spot.insert(oracle, price);
    }

    pub fn set_oracle_period_value(&self, oracle: Address, period: u64, value: Quantity) {
        self.lock().oracle_period.insert((oracle, period), value);
    }

    pub fn add_maco_manager(&self, manager: Address, record: MacoManagerRecord) {
        self.lock().macos.insert(manager, (record, 0));
    }

    pub fn maco_last_crossover(&self, manager: Address) -> Option<Timestamp> {
        self.lock().macos.get(&manager).map(|(_, ts)| *ts)
    }

    pub fn add_asset_pair_manager(
        &self,
        manager: Address,
        record: AssetPairManagerRecord,
        base_asset_allocation: Quantity,
        allocator_next_set: Address,
    ) {
        self.lock().asset_pairs.insert(
            manager,
            AssetPairState {
                record,
                recent_initial_propose: 0,
                base_asset_allocation,
                allocator_next_set,
            },
        );
    }

    pub fn asset_pair_recent_propose(&self, manager: Address) -> Option<Timestamp> {
        self.lock()
            .asset_pairs
            .get(&manager)
            .map(|s| s.recent_initial_propose)
    }
}

fn balance_of(state: &LedgerState, token: Address, owner: Address) -> Quantity {
    state
        .balances
        .get(&(token, owner))
        .copied()
        .unwrap_or_default()
}

fn mint_into(state: &mut LedgerState, token: Address, owner: Address, amount: Quantity) {
    *state.balances.entry((token, owner)).or_default() += amount;
    let record = state.tokens.entry(token).or_insert_with(|| TokenRecord {
        name: "Token".to_string(),
        symbol: "TKN".to_string(),
        decimals: 18,
        total_supply: Quantity::zero(),
    });
    record.total_supply += amount;
}

fn burn_from(
    state: &mut LedgerState,
    token: Address,
    owner: Address,
    amount: Quantity,
) -> Result<(), String> {
    debit(state, token, owner, amount)?;
    if let Some(record) = state.tokens.get_mut(&token) {
        record.total_supply = record.total_supply.saturating_sub(amount);
    }
    Ok(())
}

fn debit(
    state: &mut LedgerState,
    token: Address,
    owner: Address,
    amount: Quantity,
) -> Result<(), String> {
    let balance = state.balances.entry((token, owner)).or_default();
    if *balance < amount {
        return Err("ERC20: transfer amount exceeds balance".to_string());
    }
    *balance -= amount;
    Ok(())
}

fn move_vault(
    state: &mut LedgerState,
    token: Address,
    from: Address,
    amount: Quantity,
) -> Result<(), String> {
    let held = state.vault.entry((token, from)).or_default();
    if *held < amount {
        return Err("Vault: insufficient owner balance".to_string());
    }
    *held -= amount;
    Ok(())
}

/// Contract-side simulation of a single transaction
fn apply(state: &mut LedgerState, call: &ContractCall, opts: &TxOptions) -> Result<(), String> {
    let now = state.now;
    let sender = opts.from;

    match call {
        ContractCall::Erc20Approve {
            token,
            spender,
            amount,
        } => {
            state.allowances.insert((*token, sender, *spender), *amount);
        }
        ContractCall::Erc20Transfer { token, to, amount } => {
            debit(state, *token, sender, *amount)?;
            *state.balances.entry((*token, *to)).or_default() += *amount;
        }
        ContractCall::CoreIssue { set, quantity, .. } => {
            let record = state.sets.get(set).cloned().ok_or("Core.issue: invalid set")?;
            if !(*quantity % record.natural_unit).is_zero() {
                return Err("Core.issue: quantity must be multiple of natural unit".to_string());
            }
            for (component, unit) in record.components.iter().zip(&record.units) {
                let required = *unit * *quantity / record.natural_unit;
                debit(state, *component, sender, required)?;
                *state.vault.entry((*component, *set)).or_default() += required;
            }
            mint_into(state, *set, sender, *quantity);
        }
        ContractCall::CoreRedeem { set, quantity, .. }
        | ContractCall::CoreRedeemAndWithdrawTo { set, quantity, .. } => {
            let record = state.sets.get(set).cloned().ok_or("Core.redeem: invalid set")?;
            if !(*quantity % record.natural_unit).is_zero() {
                return Err("Core.redeem: quantity must be multiple of natural unit".to_string());
            }
            burn_from(state, *set, sender, *quantity)?;
            for (index, (component, unit)) in record.components.iter().zip(&record.units).enumerate()
            {
                let amount = *unit * *quantity / record.natural_unit;
                move_vault(state, *component, *set, amount)?;
                match call {
                    ContractCall::CoreRedeemAndWithdrawTo {
                        to,
                        tokens_to_exclude,
                        ..
                    } if !tokens_to_exclude.bit(index) => {
                        *state.balances.entry((*component, *to)).or_default() += amount;
                    }
                    _ => {
                        *state.vault.entry((*component, sender)).or_default() += amount;
                    }
                }
            }
        }
        ContractCall::Propose {
            rebalancing_set,
            next_set,
            auction_library,
            auction_time_to_pivot,
            auction_start_price,
            auction_pivot_price,
        } => {
            let next_known = state.sets.contains_key(next_set);
            let record = state
                .rebalancing
                .get_mut(rebalancing_set)
                .ok_or("propose: unknown rebalancing set")?;
            if record.state != RebalanceState::Default {
                return Err("RebalancingSetToken.propose: State must be in Default".to_string());
            }
            if sender != record.manager {
                return Err("RebalancingSetToken.propose: Sender must be manager".to_string());
            }
            if now < record.last_rebalance_timestamp + record.rebalance_interval {
                return Err("RebalancingSetToken.propose: Rebalance interval not elapsed".to_string());
            }
            if !next_known {
                return Err("RebalancingSetToken.propose: Invalid or disabled proposed SetToken".to_string());
            }
            record.state = RebalanceState::Proposal;
            record.next_set = *next_set;
            record.auction_library = *auction_library;
            record.auction.auction_time_to_pivot = *auction_time_to_pivot;
            record.auction.auction_start_price = *auction_start_price;
            record.auction.auction_pivot_price = *auction_pivot_price;
            record.proposal_start_time = now;
        }
        ContractCall::StartRebalance { rebalancing_set } => {
            start_rebalance(state, *rebalancing_set)?;
        }
        ContractCall::Bid {
            rebalancing_set,
            quantity,
            allow_partial_fill,
            ..
        }
        | ContractCall::BidWithEther {
            rebalancing_set,
            quantity,
            allow_partial_fill,
            ..
        } => {
            let record = state
                .rebalancing
                .get(rebalancing_set)
                .cloned()
                .ok_or("bid: unknown rebalancing set")?;
            if record.state != RebalanceState::Rebalance {
                return Err("RebalanceAuctionModule.bid: State must be Rebalance".to_string());
            }
            let minimum_bid = record.bidding.minimum_bid;
            if minimum_bid.is_zero() || !(*quantity % minimum_bid).is_zero() {
                return Err("RebalancingSetToken.placeBid: Must bid multiple of minimum bid".to_string());
            }
            let remaining = record.bidding.remaining_current_sets;
            let executed = if *quantity <= remaining {
                *quantity
            } else if *allow_partial_fill {
                remaining / minimum_bid * minimum_bid
            } else {
                return Err("RebalancingSetToken.placeBid: Bid exceeds remaining current sets".to_string());
            };

            let divisor = state
                .curves
                .get(&record.auction_library)
                .copied()
                .ok_or("bid: unknown price library")?;
            let (inflow, outflow) = bid_flows(&record, divisor, now, executed)?;
            let tokens = &record.combined_token_array;
            for (token, amount) in tokens.iter().zip(&outflow) {
                let key = (*token, *rebalancing_set);
                if state.vault.get(&key).copied().unwrap_or_default() < *amount {
                    return Err("Vault.decrementTokenOwner: insufficient balance".to_string());
                }
            }
            for ((token, inflow), outflow) in tokens.iter().zip(&inflow).zip(&outflow) {
                let held = state.vault.entry((*token, *rebalancing_set)).or_default();
                *held = *held + *inflow - *outflow;
            }

            if let Some(record) = state.rebalancing.get_mut(rebalancing_set) {
                record.bidding.remaining_current_sets = remaining - executed;
            }
        }
        ContractCall::SettleRebalance { rebalancing_set } => {
            let record = state
                .rebalancing
                .get_mut(rebalancing_set)
                .ok_or("settle: unknown rebalancing set")?;
            if record.state != RebalanceState::Rebalance {
                return Err("RebalancingSetToken.settleRebalance: State must be Rebalance".to_string());
            }
            if record.bidding.remaining_current_sets >= record.bidding.minimum_bid {
                return Err("RebalancingSetToken.settleRebalance: Rebalance not completed".to_string());
            }
            record.state = RebalanceState::Default;
            record.current_set = record.next_set;
            record.last_rebalance_timestamp = now;
            let (current_set, unit_shares) = (record.current_set, record.unit_shares);
            if let Some(set) = state.sets.get_mut(rebalancing_set) {
                set.components = vec![current_set];
                set.units = vec![unit_shares];
            }
        }
        ContractCall::EndFailedAuction { rebalancing_set } => {
            let record = state
                .rebalancing
                .get_mut(rebalancing_set)
                .ok_or("endFailedAuction: unknown rebalancing set")?;
            if record.state != RebalanceState::Rebalance {
                return Err("RebalancingSetToken.endFailedAuction: State must be Rebalance".to_string());
            }
            if now < record.auction.auction_start_time + record.auction.auction_time_to_pivot {
                return Err("RebalancingSetToken.endFailedAuction: Pivot time not yet reached".to_string());
            }
            record.state = if record.bidding.remaining_current_sets
                == record.bidding.starting_current_sets
            {
                RebalanceState::Default
            } else {
                RebalanceState::Drawdown
            };
            record.last_rebalance_timestamp = now;
        }
        ContractCall::RedeemFromFailedRebalance {
            rebalancing_set, ..
        } => {
            let in_drawdown = state
                .rebalancing
                .get(rebalancing_set)
                .map(|r| r.state == RebalanceState::Drawdown)
                .ok_or("redeemFromFailedRebalance: unknown rebalancing set")?;
            if !in_drawdown {
                return Err("RebalancingSetToken.burn: State must be Drawdown".to_string());
            }
            let held = balance_of(state, *rebalancing_set, sender);
            if held.is_zero() {
                return Err("RebalancingSetToken.burn: Nothing to redeem".to_string());
            }
            burn_from(state, *rebalancing_set, sender, held)?;
        }
        ContractCall::ManagerInitialPropose { manager } => {
            if let Some((_, ts)) = state.macos.get_mut(manager) {
                *ts = now;
            } else if let Some(pair) = state.asset_pairs.get_mut(manager) {
                pair.recent_initial_propose = now;
            } else {
                return Err("initialPropose: unknown manager".to_string());
            }
        }
        ContractCall::ManagerConfirmPropose { manager } => {
            let (rebalancing_set, next_set, library, time_to_pivot) =
                if let Some((record, _)) = state.macos.get(manager) {
                    let current = state
                        .rebalancing
                        .get(&record.rebalancing_set)
                        .map(|r| r.current_set)
                        .ok_or("confirmPropose: unknown rebalancing set")?;
                    let next = if current == record.risk_collateral {
                        record.stable_collateral
                    } else {
                        record.risk_collateral
                    };
                    (
                        record.rebalancing_set,
                        next,
                        record.auction_library,
                        record.auction_time_to_pivot,
                    )
                } else if let Some(pair) = state.asset_pairs.get_mut(manager) {
                    pair.base_asset_allocation =
                        pair.record.allocation_precision - pair.base_asset_allocation;
                    (
                        pair.record.rebalancing_set,
                        pair.allocator_next_set,
                        pair.record.auction_library,
                        pair.record.auction_time_to_pivot,
                    )
                } else {
                    return Err("confirmPropose: unknown manager".to_string());
                };

            let divisor = state.curves.get(&library).copied().unwrap_or_default();
            let propose = ContractCall::Propose {
                rebalancing_set,
                next_set,
                auction_library: library,
                auction_time_to_pivot: time_to_pivot,
                auction_start_price: divisor,
                auction_pivot_price: divisor,
            };
            apply(state, &propose, &TxOptions::new(*manager))?;
        }
        ContractCall::ExchangeIssue { params, .. } => {
            mint_into(state, params.set_address, sender, params.quantity);
        }
        ContractCall::IssueRebalancingSetWithEther {
            rebalancing_set,
            rebalancing_set_quantity,
            ..
        } => {
            mint_into(state, *rebalancing_set, sender, *rebalancing_set_quantity);
        }
    }
    Ok(())
}

/// Inflows and outflows of a bid of `executed` current sets at `now`
fn bid_flows(
    record: &RebalancingRecord,
    divisor: Quantity,
    now: Timestamp,
    executed: Quantity,
) -> Result<(Vec<Quantity>, Vec<Quantity>), String> {
    let auction = &record.auction;
    let numerator = if auction.auction_time_to_pivot == 0 {
        auction.auction_pivot_price
    } else {
        let elapsed = Quantity::from(now.saturating_sub(auction.auction_start_time));
        let duration = Quantity::from(auction.auction_time_to_pivot);
        let (start, pivot) = (auction.auction_start_price, auction.auction_pivot_price);
        if pivot >= start {
            start + elapsed * (pivot - start) / duration
        } else {
            start.saturating_sub(elapsed * (start - pivot) / duration)
        }
    };
    let coefficient = record.bidding.minimum_bid / divisor;
    if numerator.is_zero() || coefficient.is_zero() {
        return Err("RebalancingSetToken.placeBid: Invalid auction price".to_string());
    }
    let effective = executed * divisor / numerator;

    let mut inflow = Vec::with_capacity(record.combined_current_units.len());
    let mut outflow = Vec::with_capacity(record.combined_current_units.len());
    for (current, next) in record
        .combined_current_units
        .iter()
        .zip(&record.combined_next_units)
    {
        let a = *next * divisor;
        let b = *current * numerator;
        if a > b {
            inflow.push(effective * (a - b) / coefficient / divisor);
            outflow.push(Quantity::zero());
        } else {
            inflow.push(Quantity::zero());
            outflow.push(effective * (b - a) / coefficient / divisor);
        }
    }
    Ok((inflow, outflow))
}

fn start_rebalance(state: &mut LedgerState, rebalancing_set: Address) -> Result<(), String> {
    let now = state.now;
    let record = state
        .rebalancing
        .get(&rebalancing_set)
        .cloned()
        .ok_or("startRebalance: unknown rebalancing set")?;
    if record.state != RebalanceState::Proposal {
        return Err("RebalancingSetToken.startRebalance: State must be Proposal".to_string());
    }
    if now < record.proposal_start_time + record.proposal_period {
        return Err("RebalancingSetToken.startRebalance: Proposal period not elapsed".to_string());
    }

    let current = state
        .sets
        .get(&record.current_set)
        .cloned()
        .ok_or("startRebalance: unknown current set")?;
    let next = state
        .sets
        .get(&record.next_set)
        .cloned()
        .ok_or("startRebalance: unknown next set")?;
    let divisor = state
        .curves
        .get(&record.auction_library)
        .copied()
        .ok_or("startRebalance: unknown price library")?;

    let mut combined = current.components.clone();
    for token in &next.components {
        if !combined.contains(token) {
            combined.push(*token);
        }
    }
    let max_unit = max(current.natural_unit, next.natural_unit);
    let scaled = |set: &SetRecord| -> Vec<Quantity> {
        combined
            .iter()
            .map(|token| match set.components.iter().position(|c| c == token) {
                Some(i) => set.units[i] * max_unit / set.natural_unit,
                None => Quantity::zero(),
            })
            .collect()
    };
    let current_units = scaled(&current);
    let next_units = scaled(&next);

    let supply = state
        .tokens
        .get(&rebalancing_set)
        .map(|t| t.total_supply)
        .unwrap_or_default();
    let remaining = supply * record.unit_shares / record.natural_unit;

    // The current sets backing the supply are redeemed into the vault
    for (token, unit) in current.components.iter().zip(&current.units) {
        *state.vault.entry((*token, rebalancing_set)).or_default() +=
            remaining * *unit / current.natural_unit;
    }

    let record = state
        .rebalancing
        .get_mut(&rebalancing_set)
        .ok_or("startRebalance: unknown rebalancing set")?;
    record.state = RebalanceState::Rebalance;
    record.auction.auction_start_time = now;
    record.combined_token_array = combined;
    record.combined_current_units = current_units;
    record.combined_next_units = next_units;
    record.bidding = BiddingParameters {
        minimum_bid: max_unit * divisor,
        remaining_current_sets: remaining,
        starting_current_sets: remaining,
    };
    Ok(())
}

#[async_trait]
impl ContractGateway for FakeLedger {
    async fn erc20_balance_of(&self, token: Address, owner: Address) -> GatewayResult<Quantity> {
        self.read(|s| Ok(balance_of(s, token, owner))).await
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> GatewayResult<Quantity> {
        self.read(|s| {
            Ok(s.allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or_default())
        })
        .await
    }

    async fn erc20_total_supply(&self, token: Address) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.tokens
                .get(&token)
                .map(|t| t.total_supply)
                .ok_or_else(|| no_contract(token, "token"))
        })
        .await
    }

    async fn erc20_decimals(&self, token: Address) -> GatewayResult<u8> {
        self.read(|s| {
            s.tokens
                .get(&token)
                .map(|t| t.decimals)
                .ok_or_else(|| no_contract(token, "token"))
        })
        .await
    }

    async fn erc20_name(&self, token: Address) -> GatewayResult<String> {
        self.read(|s| {
            s.tokens
                .get(&token)
                .map(|t| t.name.clone())
                .ok_or_else(|| no_contract(token, "token"))
        })
        .await
    }

    async fn erc20_symbol(&self, token: Address) -> GatewayResult<String> {
        self.read(|s| {
            s.tokens
                .get(&token)
                .map(|t| t.symbol.clone())
                .ok_or_else(|| no_contract(token, "token"))
        })
        .await
    }

    async fn set_natural_unit(&self, set: Address) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.sets
                .get(&set)
                .map(|r| r.natural_unit)
                .ok_or_else(|| no_contract(set, "set"))
        })
        .await
    }

    async fn set_components(&self, set: Address) -> GatewayResult<Vec<Address>> {
        self.read(|s| {
            s.sets
                .get(&set)
                .map(|r| r.components.clone())
                .ok_or_else(|| no_contract(set, "set"))
        })
        .await
    }

    async fn set_units(&self, set: Address) -> GatewayResult<Vec<Quantity>> {
        self.read(|s| {
            s.sets
                .get(&set)
                .map(|r| r.units.clone())
                .ok_or_else(|| no_contract(set, "set"))
        })
        .await
    }

    async fn core_valid_set(&self, core: Address, set: Address) -> GatewayResult<bool> {
        self.read(|s| {
            s.cores
                .get(&core)
                .map(|c| c.valid_sets.contains(&set))
                .ok_or_else(|| no_contract(core, "core"))
        })
        .await
    }

    async fn core_transfer_proxy(&self, core: Address) -> GatewayResult<Address> {
        self.read(|s| {
            s.cores
                .get(&core)
                .map(|c| c.transfer_proxy)
                .ok_or_else(|| no_contract(core, "core"))
        })
        .await
    }

    async fn core_vault(&self, core: Address) -> GatewayResult<Address> {
        self.read(|s| {
            s.cores
                .get(&core)
                .map(|c| c.vault)
                .ok_or_else(|| no_contract(core, "core"))
        })
        .await
    }

    async fn vault_balance(
        &self,
        _vault: Address,
        token: Address,
        owner: Address,
    ) -> GatewayResult<Quantity> {
        self.read(|s| Ok(s.vault.get(&(token, owner)).copied().unwrap_or_default()))
            .await
    }

    async fn rebalancing_manager(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.rebalancing_field(rebalancing_set, |r| r.manager).await
    }

    async fn rebalancing_current_set(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.rebalancing_field(rebalancing_set, |r| r.current_set)
            .await
    }

    async fn rebalancing_next_set(&self, rebalancing_set: Address) -> GatewayResult<Address> {
        self.rebalancing_field(rebalancing_set, |r| r.next_set).await
    }

    async fn rebalancing_state(&self, rebalancing_set: Address) -> GatewayResult<RebalanceState> {
        self.rebalancing_field(rebalancing_set, |r| r.state).await
    }

    async fn rebalancing_last_rebalance_timestamp(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.rebalancing_field(rebalancing_set, |r| r.last_rebalance_timestamp)
            .await
    }

    async fn rebalancing_interval(&self, rebalancing_set: Address) -> GatewayResult<Timestamp> {
        self.rebalancing_field(rebalancing_set, |r| r.rebalance_interval)
            .await
    }

    async fn rebalancing_proposal_period(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.rebalancing_field(rebalancing_set, |r| r.proposal_period)
            .await
    }

    async fn rebalancing_proposal_start_time(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Timestamp> {
        self.rebalancing_field(rebalancing_set, |r| r.proposal_start_time)
            .await
    }

    async fn rebalancing_auction_library(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Address> {
        self.rebalancing_field(rebalancing_set, |r| r.auction_library)
            .await
    }

    async fn rebalancing_auction_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<AuctionParameters> {
        self.rebalancing_field(rebalancing_set, |r| r.auction.clone())
            .await
    }

    async fn rebalancing_bidding_parameters(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<BiddingParameters> {
        self.rebalancing_field(rebalancing_set, |r| r.bidding.clone())
            .await
    }

    async fn rebalancing_combined_token_array(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Address>> {
        self.rebalancing_field(rebalancing_set, |r| r.combined_token_array.clone())
            .await
    }

    async fn rebalancing_combined_current_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>> {
        self.rebalancing_field(rebalancing_set, |r| r.combined_current_units.clone())
            .await
    }

    async fn rebalancing_combined_next_units(
        &self,
        rebalancing_set: Address,
    ) -> GatewayResult<Vec<Quantity>> {
        self.rebalancing_field(rebalancing_set, |r| r.combined_next_units.clone())
            .await
    }

    async fn rebalancing_unit_shares(&self, rebalancing_set: Address) -> GatewayResult<Quantity> {
        self.rebalancing_field(rebalancing_set, |r| r.unit_shares)
            .await
    }

    async fn price_curve_divisor(&self, curve: Address) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.curves
                .get(&curve)
                .copied()
                .ok_or_else(|| no_contract(curve, "price curve"))
        })
        .await
    }

    async fn oracle_read(&self, oracle: Address) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.oracle_spot
                .get(&oracle)
                .copied()
                .ok_or_else(|| no_contract(oracle, "oracle"))
        })
        .await
    }

    async fn oracle_read_period(&self, oracle: Address, period: u64) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.oracle_period
                .get(&(oracle, period))
                .copied()
                .ok_or_else(|| no_contract(oracle, "oracle"))
        })
        .await
    }

    async fn maco_manager(&self, manager: Address) -> GatewayResult<MacoManagerRecord> {
        self.read(|s| {
            s.macos
                .get(&manager)
                .map(|(r, _)| r.clone())
                .ok_or_else(|| no_contract(manager, "MACO manager"))
        })
        .await
    }

    async fn maco_last_crossover_confirmation_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp> {
        self.read(|s| {
            s.macos
                .get(&manager)
                .map(|(_, ts)| *ts)
                .ok_or_else(|| no_contract(manager, "MACO manager"))
        })
        .await
    }

    async fn asset_pair_manager(&self, manager: Address) -> GatewayResult<AssetPairManagerRecord> {
        self.read(|s| {
            s.asset_pairs
                .get(&manager)
                .map(|p| p.record.clone())
                .ok_or_else(|| no_contract(manager, "asset pair manager"))
        })
        .await
    }

    async fn asset_pair_recent_initial_propose_timestamp(
        &self,
        manager: Address,
    ) -> GatewayResult<Timestamp> {
        self.read(|s| {
            s.asset_pairs
                .get(&manager)
                .map(|p| p.recent_initial_propose)
                .ok_or_else(|| no_contract(manager, "asset pair manager"))
        })
        .await
    }

    async fn asset_pair_base_asset_allocation(
        &self,
        manager: Address,
    ) -> GatewayResult<Quantity> {
        self.read(|s| {
            s.asset_pairs
                .get(&manager)
                .map(|p| p.base_asset_allocation)
                .ok_or_else(|| no_contract(manager, "asset pair manager"))
        })
        .await
    }

    async fn latest_block_timestamp(&self) -> GatewayResult<Timestamp> {
        self.read(|s| Ok(s.now)).await
    }

    async fn estimate_gas(&self, _call: &ContractCall, _opts: &TxOptions) -> GatewayResult<u64> {
        self.read(|_| Ok(250_000)).await
    }

    async fn send_transaction(
        &self,
        call: ContractCall,
        opts: TxOptions,
    ) -> GatewayResult<TxHash> {
        let mut state = self.lock();
        let target = call.target();

        if let Some(reason) = state.revert_next.take() {
            return Err(GatewayError::Reverted { target, reason });
        }

        apply(&mut state, &call, &opts).map_err(|reason| GatewayError::Reverted { target, reason })?;

        state.submitted.push((call, opts));
        state.tx_count += 1;
        Ok(TxHash::from_low_u64_be(state.tx_count))
    }
}

impl FakeLedger {
    async fn rebalancing_field<T>(
        &self,
        rebalancing_set: Address,
        f: impl FnOnce(&RebalancingRecord) -> T,
    ) -> GatewayResult<T> {
        self.read(|s| {
            s.rebalancing
                .get(&rebalancing_set)
                .map(f)
                .ok_or_else(|| no_contract(rebalancing_set, "rebalancing set"))
        })
        .await
    }
}
