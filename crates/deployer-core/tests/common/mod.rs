#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deployer_core::address::{Address, Cell, ContractInit};
use deployer_core::api::types::{AccountState, AccountStatus, GetMethodResult, TransactionInfo};
use deployer_core::api::{ApiDialect, LedgerApi, TransactionLookup};
use deployer_core::error::{PromptError, SendError, TransportError};
use deployer_core::prompt::Prompter;
use deployer_core::send::{SendOutcome, Sender, SenderArguments};

/// One scripted answer to an account-state query.
#[derive(Debug, Clone, Copy)]
pub enum Poll {
    Status(AccountStatus),
    Fail,
}

#[derive(Default)]
struct LedgerState {
    polls: VecDeque<Poll>,
    fallback: Option<AccountStatus>,
    activate_on_send: bool,
    transactions: Vec<TransactionInfo>,
    tx_failures: u32,
    state_queries: u32,
    sent: Vec<Vec<u8>>,
}

/// In-memory ledger. Account-state answers are taken from a script, then
/// from a fallback status.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn with_status(status: AccountStatus) -> Self {
        let ledger = Self::default();
        ledger.lock().fallback = Some(status);
        ledger
    }

    pub fn script(self, polls: impl IntoIterator<Item = Poll>) -> Self {
        self.lock().polls.extend(polls);
        self
    }

    pub fn activate_on_send(self) -> Self {
        self.lock().activate_on_send = true;
        self
    }

    pub fn transaction(self, tx: TransactionInfo) -> Self {
        self.lock().transactions.push(tx);
        self
    }

    pub fn failing_tx_fetches(self, failures: u32) -> Self {
        self.lock().tx_failures = failures;
        self
    }

    pub fn activate(&self) {
        let mut state = self.lock();
        state.polls.clear();
        state.fallback = Some(AccountStatus::Active);
    }

    pub fn state_queries(&self) -> u32 {
        self.lock().state_queries
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger lock")
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    fn dialect(&self) -> ApiDialect {
        ApiDialect::V2
    }

    async fn account_state(&self, _address: &Address) -> Result<AccountState, TransportError> {
        let mut state = self.lock();
        state.state_queries += 1;
        let poll = state
            .polls
            .pop_front()
            .or(state.fallback.map(Poll::Status))
            .unwrap_or(Poll::Status(AccountStatus::Nonexist));
        match poll {
            Poll::Status(status) => Ok(AccountState {
                status,
                balance: 0,
                last_transaction: None,
            }),
            Poll::Fail => Err(TransportError::Status {
                status: 503,
                url: "mock://ledger".to_string(),
                body: "unavailable".to_string(),
            }),
        }
    }

    async fn transactions(
        &self,
        _address: &Address,
        limit: u32,
    ) -> Result<Vec<TransactionInfo>, TransportError> {
        let mut state = self.lock();
        if state.tx_failures > 0 {
            state.tx_failures -= 1;
            return Err(TransportError::Api("indexing lag".to_string()));
        }
        Ok(state
            .transactions
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn run_get_method(
        &self,
        _address: &Address,
        _method: &str,
    ) -> Result<GetMethodResult, TransportError> {
        Ok(GetMethodResult {
            exit_code: 0,
            stack: Vec::new(),
        })
    }

    async fn send_message(&self, message: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.sent.push(message.to_vec());
        if state.activate_on_send {
            state.polls.clear();
            state.fallback = Some(AccountStatus::Active);
        }
        Ok(())
    }
}

/// Records every transfer and optionally activates the ledger afterwards.
pub struct RecordingSender {
    pub sent: Mutex<Vec<SenderArguments>>,
    ledger: Option<Arc<MockLedger>>,
}

impl RecordingSender {
    pub fn new(ledger: Option<Arc<MockLedger>>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            ledger,
        }
    }

    pub fn sent(&self) -> Vec<SenderArguments> {
        self.sent.lock().expect("sender lock").clone()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, args: SenderArguments) -> Result<SendOutcome, SendError> {
        self.sent.lock().expect("sender lock").push(args);
        if let Some(ledger) = &self.ledger {
            ledger.activate();
        }
        Ok(SendOutcome::Submitted)
    }

    fn address(&self) -> Option<Address> {
        None
    }
}

pub enum Lookup {
    Found(TransactionInfo),
    Missing,
    Fail,
}

pub struct MockIndexer(pub Lookup);

#[async_trait]
impl TransactionLookup for MockIndexer {
    async fn transaction_by_hash(
        &self,
        _hash: &str,
    ) -> Result<Option<TransactionInfo>, TransportError> {
        match &self.0 {
            Lookup::Found(tx) => Ok(Some(tx.clone())),
            Lookup::Missing => Ok(None),
            Lookup::Fail => Err(TransportError::Api("indexer down".to_string())),
        }
    }
}

/// Answers prompts from a script and keeps everything shown.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    pub shown: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(ToString::to_string).collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().expect("prompter lock").clone()
    }

    fn next(&self) -> Result<String, PromptError> {
        self.answers
            .lock()
            .expect("prompter lock")
            .pop_front()
            .ok_or(PromptError::Closed)
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&self, _message: &str, choices: &[String]) -> Result<usize, PromptError> {
        let answer = self.next()?;
        Ok(choices.iter().position(|c| *c == answer).unwrap_or(0))
    }

    fn confirm(&self, _message: &str) -> Result<bool, PromptError> {
        Ok(self.next()? == "y")
    }

    fn input(&self, _message: &str) -> Result<String, PromptError> {
        self.next()
    }

    fn show(&self, text: &str) -> Result<(), PromptError> {
        self.shown.lock().expect("prompter lock").push(text.to_string());
        Ok(())
    }
}

pub fn sample_init() -> ContractInit {
    ContractInit::new(
        Cell::new(b"counter-code".to_vec()),
        Cell::new(vec![0, 0, 0, 7]),
    )
}

pub fn tx(exit_code: Option<i32>) -> TransactionInfo {
    TransactionInfo {
        hash: "cd".repeat(32),
        lt: 47_000_000_001,
        utime: 1_760_000_000,
        exit_code,
        aborted: false,
        success: None,
        total_fees: 2_345_678,
    }
}
