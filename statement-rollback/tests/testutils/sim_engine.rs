//! Simulated host engine for integration tests
//!
//! Every statement runs through the same lifecycle a host engine exposes:
//! command boundary, then either the planner/executor hooks or utility
//! processing, then abort on failure. Data is a map of integer tables; each
//! subtransaction keeps a snapshot to roll back to.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use statement_rollback::{
    Destination, ExecutorHooks, HookChain, PlannedStatement, Privileges, RangeTableEntry,
    RangeTableKind, RelationPersistence, RollbackConfig, RollbackError, StatementError,
    StatementRollback, SubtransactionHost, TransactionKind, UtilityStatement, SETTING_ENABLED,
};

pub type Tables = BTreeMap<String, Vec<i64>>;

/// Statements understood by the simulated engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Begin,
    Commit,
    Rollback,
    PrepareTransaction(String),
    CommitPrepared(String),
    RollbackPrepared(String),
    Savepoint(String),
    Release(String),
    RollbackTo(String),
    CreateTable(String),
    CreateTempTable(String),
    /// `SET name = value`
    Set(String, String),
    Insert(String, i64),
    /// Inserts the row, then fails with a unique violation
    InsertFailing(String, i64),
    /// Sets every row of the table to the value
    Update(String, i64),
    Select(String),
    SelectForUpdate(String),
    /// `SELECT 1/0`
    Fail,
    /// `SELECT f()` where `f` runs the statements through SPI
    CallFunction(Vec<Stmt>),
    /// Panics in the middle of execution
    Panic,
    /// `DECLARE name CURSOR FOR SELECT * FROM table`
    DeclareCursor(String, String),
    Fetch(String),
    Close(String),
}

impl Stmt {
    pub fn insert(table: &str, value: i64) -> Self {
        Stmt::Insert(table.to_string(), value)
    }

    pub fn select(table: &str) -> Self {
        Stmt::Select(table.to_string())
    }

    pub fn create_table(table: &str) -> Self {
        Stmt::CreateTable(table.to_string())
    }

    fn is_planned(&self) -> bool {
        matches!(
            self,
            Stmt::Insert(..)
                | Stmt::InsertFailing(..)
                | Stmt::Update(..)
                | Stmt::Select(_)
                | Stmt::SelectForUpdate(_)
                | Stmt::Fail
                | Stmt::CallFunction(_)
                | Stmt::Panic
        )
    }

    fn allowed_in_failed_block(&self) -> bool {
        matches!(self, Stmt::Commit | Stmt::Rollback | Stmt::RollbackTo(_))
    }
}

/// Result rows of a statement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    pub rows: Vec<i64>,
}

/// Subtransaction primitive the engine actually performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Begin,
    Release,
    RollbackAndRelease,
}

#[derive(Debug, Clone)]
struct Subtransaction {
    /// `None` for implicit savepoints
    name: Option<String>,
    snapshot: Tables,
}

#[derive(Debug, Clone)]
struct Block {
    data: Tables,
    stack: Vec<Subtransaction>,
    failed: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    committed: Tables,
    temporary: BTreeSet<String>,
    /// Working copy of a statement running outside a block
    autocommit: Option<Tables>,
    block: Option<Block>,
    prepared: BTreeMap<String, Tables>,
    cursors: BTreeMap<String, (Vec<i64>, usize)>,
    calls: Vec<HostCall>,
    /// Primitive that fails the next time it is called
    failing: Option<HostCall>,
}

impl EngineState {
    fn data_mut(&mut self) -> &mut Tables {
        match self.block.as_mut() {
            Some(block) => &mut block.data,
            None => {
                let committed = &self.committed;
                self.autocommit.get_or_insert_with(|| committed.clone())
            }
        }
    }

    fn data(&self) -> &Tables {
        match (&self.block, &self.autocommit) {
            (Some(block), _) => &block.data,
            (None, Some(autocommit)) => autocommit,
            (None, None) => &self.committed,
        }
    }

    fn injected_failure(&mut self, call: HostCall) -> Result<(), RollbackError> {
        if self.failing == Some(call) {
            self.failing = None;
            return Err(RollbackError::Host(format!("{:?} failed", call)));
        }
        Ok(())
    }

    fn block_mut(&mut self, command: &str) -> Result<&mut Block, RollbackError> {
        self.block.as_mut().ok_or_else(|| {
            error(
                "25P01",
                &format!("{} can only be used in transaction blocks", command),
            )
        })
    }
}

fn error(sqlstate: &str, message: &str) -> RollbackError {
    StatementError::new(sqlstate, message).into()
}

fn no_savepoint(name: &str) -> RollbackError {
    error("3B001", &format!("savepoint \"{}\" does not exist", name))
}

struct SimHost<'a> {
    state: &'a RefCell<EngineState>,
}

impl SubtransactionHost for SimHost<'_> {
    fn begin_implicit_savepoint(&mut self) -> Result<(), RollbackError> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        state.injected_failure(HostCall::Begin)?;
        if let Some(block) = state.block.as_mut() {
            if block.failed {
                return Err(RollbackError::Host(
                    "current transaction is aborted".to_string(),
                ));
            }
            let snapshot = block.data.clone();
            block.stack.push(Subtransaction {
                name: None,
                snapshot,
            });
            state.calls.push(HostCall::Begin);
        }
        Ok(())
    }

    fn release_implicit_savepoint(&mut self) -> Result<(), RollbackError> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        state.injected_failure(HostCall::Release)?;
        if let Some(block) = state.block.as_mut() {
            if block.stack.pop().is_some() {
                state.calls.push(HostCall::Release);
            }
        }
        Ok(())
    }

    fn rollback_to_and_release_implicit_savepoint(&mut self) -> Result<(), RollbackError> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        state.injected_failure(HostCall::RollbackAndRelease)?;
        if let Some(block) = state.block.as_mut() {
            if let Some(sub) = block.stack.pop() {
                block.data = sub.snapshot;
                block.failed = false;
                state.calls.push(HostCall::RollbackAndRelease);
            }
        }
        Ok(())
    }

    fn is_transaction_block_open(&self) -> bool {
        self.state.borrow().block.is_some()
    }
}

/// In-memory host engine with statement rollback installed
pub struct SimEngine {
    chain: HookChain,
    session: Rc<StatementRollback>,
    state: RefCell<EngineState>,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::with_config(RollbackConfig::default())
    }

    pub fn with_config(config: RollbackConfig) -> Self {
        Self::with_hooks(config, Vec::new())
    }

    /// Engine with extra handlers registered after statement rollback
    pub fn with_hooks(config: RollbackConfig, extra: Vec<Rc<dyn ExecutorHooks>>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut chain = HookChain::new();
        let session = StatementRollback::install(&mut chain, config);
        for hook in extra {
            chain.register(hook);
        }

        Self {
            chain,
            session,
            state: RefCell::new(EngineState::default()),
        }
    }

    pub fn session(&self) -> &StatementRollback {
        &self.session
    }

    /// Run one client statement
    pub fn execute(&self, stmt: Stmt) -> Result<Outcome, RollbackError> {
        self.boundary()?;

        {
            let mut state = self.state.borrow_mut();
            if state.block.is_none() {
                let snapshot = state.committed.clone();
                state.autocommit = Some(snapshot);
            }
        }

        let result = self
            .check_not_failed(&stmt)
            .and_then(|_| self.dispatch(&stmt, Destination::Client));

        match &result {
            Ok(_) => {
                {
                    let mut state = self.state.borrow_mut();
                    if let Some(data) = state.autocommit.take() {
                        state.committed = data;
                    }
                }
                self.chain.finish_xact_command();
            }
            Err(e) => {
                log::debug!("statement {:?} failed: {}", stmt, e);
                {
                    let mut state = self.state.borrow_mut();
                    state.autocommit = None;
                    if let Some(block) = state.block.as_mut() {
                        block.failed = true;
                    }
                }
                self.chain.abort_current_transaction();
            }
        }
        result
    }

    /// Run statements that are all expected to succeed
    pub fn run(&self, stmts: Vec<Stmt>) {
        for stmt in stmts {
            let description = format!("{:?}", stmt);
            if let Err(e) = self.execute(stmt) {
                panic!("{} failed: {}", description, e);
            }
        }
    }

    /// A command boundary with no statement after it
    pub fn boundary(&self) -> Result<(), RollbackError> {
        let mut host = SimHost { state: &self.state };
        self.chain.start_xact_command(&mut host)
    }

    /// Rows of a table as the session currently sees them
    pub fn table(&self, name: &str) -> Vec<i64> {
        self.state
            .borrow()
            .data()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn committed(&self, name: &str) -> Vec<i64> {
        self.state
            .borrow()
            .committed
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn host_calls(&self) -> Vec<HostCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_host_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Make the next call of `call` fail without touching any subtransaction
    pub fn fail_next_host_call(&self, call: HostCall) {
        self.state.borrow_mut().failing = Some(call);
    }

    /// Implicit savepoints stacked above the innermost client savepoint
    pub fn implicit_depth(&self) -> usize {
        self.state
            .borrow()
            .block
            .as_ref()
            .map(|block| {
                block
                    .stack
                    .iter()
                    .rev()
                    .take_while(|sub| sub.name.is_none())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Subtransaction stack, bottom first. Implicit savepoints show as `None`.
    pub fn subtransactions(&self) -> Vec<Option<String>> {
        self.state
            .borrow()
            .block
            .as_ref()
            .map(|block| block.stack.iter().map(|sub| sub.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn in_block(&self) -> bool {
        self.state.borrow().block.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.state
            .borrow()
            .block
            .as_ref()
            .map(|block| block.failed)
            .unwrap_or(false)
    }

    pub fn is_prepared(&self, gid: &str) -> bool {
        self.state.borrow().prepared.contains_key(gid)
    }

    fn check_not_failed(&self, stmt: &Stmt) -> Result<(), RollbackError> {
        if self.is_failed() && !stmt.allowed_in_failed_block() {
            return Err(error(
                "25P02",
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }
        Ok(())
    }

    fn dispatch(&self, stmt: &Stmt, dest: Destination) -> Result<Outcome, RollbackError> {
        if stmt.is_planned() {
            return self.run_planned(stmt);
        }

        let utility = utility_statement(stmt)?;
        let mut outcome = Outcome::default();
        self.chain.process_utility(&utility, dest, &mut || {
            outcome = self.run_utility(stmt)?;
            Ok(())
        })?;
        Ok(outcome)
    }

    fn run_planned(&self, stmt: &Stmt) -> Result<Outcome, RollbackError> {
        let plan = self.chain.planner(&mut || self.plan(stmt))?;
        let mut rows = Vec::new();
        self.chain.executor_run(&mut || {
            rows = self.execute_plan(stmt)?;
            Ok(())
        })?;
        self.chain.executor_finish(&mut || Ok(()))?;
        self.chain.executor_end(&plan, || {});
        Ok(Outcome { rows })
    }

    fn relation(&self, table: &str, privileges: Privileges) -> Result<RangeTableEntry, RollbackError> {
        let state = self.state.borrow();
        if !state.data().contains_key(table) {
            return Err(error(
                "42P01",
                &format!("relation \"{}\" does not exist", table),
            ));
        }
        let persistence = if state.temporary.contains(table) {
            RelationPersistence::Temporary
        } else {
            RelationPersistence::Permanent
        };
        Ok(RangeTableEntry::relation(table, privileges).with_persistence(persistence))
    }

    fn plan(&self, stmt: &Stmt) -> Result<PlannedStatement, RollbackError> {
        let range_table = match stmt {
            Stmt::Insert(table, _) | Stmt::InsertFailing(table, _) => {
                vec![self.relation(table, Privileges::INSERT)?]
            }
            Stmt::Update(table, _) | Stmt::SelectForUpdate(table) => {
                vec![self.relation(table, Privileges::SELECT | Privileges::UPDATE)?]
            }
            Stmt::Select(table) => vec![self.relation(table, Privileges::SELECT)?],
            Stmt::CallFunction(_) => vec![RangeTableEntry::other(RangeTableKind::Function)],
            Stmt::Fail | Stmt::Panic => Vec::new(),
            other => return Err(error("XX000", &format!("cannot plan {:?}", other))),
        };
        Ok(PlannedStatement::new(range_table))
    }

    fn execute_plan(&self, stmt: &Stmt) -> Result<Vec<i64>, RollbackError> {
        match stmt {
            Stmt::Insert(table, value) => {
                let mut state = self.state.borrow_mut();
                state.data_mut().entry(table.clone()).or_default().push(*value);
                Ok(Vec::new())
            }
            Stmt::InsertFailing(table, value) => {
                let mut state = self.state.borrow_mut();
                state.data_mut().entry(table.clone()).or_default().push(*value);
                Err(error(
                    "23505",
                    "duplicate key value violates unique constraint",
                ))
            }
            Stmt::Update(table, value) => {
                let mut state = self.state.borrow_mut();
                if let Some(rows) = state.data_mut().get_mut(table) {
                    rows.iter_mut().for_each(|row| *row = *value);
                }
                Ok(Vec::new())
            }
            Stmt::Select(table) | Stmt::SelectForUpdate(table) => {
                Ok(self.state.borrow().data().get(table).cloned().unwrap_or_default())
            }
            Stmt::Fail => Err(error("22012", "division by zero")),
            Stmt::Panic => panic!("executor crashed"),
            Stmt::CallFunction(body) => {
                let mut rows = Vec::new();
                for inner in body {
                    rows = self.dispatch(inner, Destination::Spi)?.rows;
                }
                Ok(rows)
            }
            other => Err(error("XX000", &format!("cannot execute {:?}", other))),
        }
    }

    fn run_utility(&self, stmt: &Stmt) -> Result<Outcome, RollbackError> {
        match stmt {
            Stmt::Begin => {
                let mut state = self.state.borrow_mut();
                if state.block.is_some() {
                    log::warn!("there is already a transaction in progress");
                } else {
                    let data = match state.autocommit.take() {
                        Some(data) => data,
                        None => state.committed.clone(),
                    };
                    state.block = Some(Block {
                        data,
                        stack: Vec::new(),
                        failed: false,
                    });
                }
            }
            Stmt::Commit => {
                let mut state = self.state.borrow_mut();
                match state.block.take() {
                    Some(block) if !block.failed => state.committed = block.data,
                    Some(_) => log::debug!("COMMIT of a failed transaction rolls back"),
                    None => log::warn!("there is no transaction in progress"),
                }
                state.cursors.clear();
            }
            Stmt::Rollback => {
                let mut state = self.state.borrow_mut();
                if state.block.take().is_none() {
                    log::warn!("there is no transaction in progress");
                }
                state.cursors.clear();
            }
            Stmt::PrepareTransaction(gid) => {
                let mut state = self.state.borrow_mut();
                match state.block.take() {
                    Some(block) if !block.failed => {
                        state.prepared.insert(gid.clone(), block.data);
                    }
                    Some(_) => log::debug!("PREPARE of a failed transaction rolls back"),
                    None => log::warn!("there is no transaction in progress"),
                }
                state.cursors.clear();
            }
            Stmt::CommitPrepared(gid) | Stmt::RollbackPrepared(gid) => {
                let mut state = self.state.borrow_mut();
                if state.block.is_some() {
                    return Err(error(
                        "25001",
                        "cannot run prepared transaction commands inside a transaction block",
                    ));
                }
                let data = state.prepared.remove(gid).ok_or_else(|| {
                    error(
                        "42704",
                        &format!("prepared transaction with identifier \"{}\" does not exist", gid),
                    )
                })?;
                if matches!(stmt, Stmt::CommitPrepared(_)) {
                    state.autocommit = Some(data);
                }
            }
            Stmt::Savepoint(name) => {
                let mut state = self.state.borrow_mut();
                let block = state.block_mut("SAVEPOINT")?;
                let snapshot = block.data.clone();
                block.stack.push(Subtransaction {
                    name: Some(name.clone()),
                    snapshot,
                });
            }
            Stmt::Release(name) => {
                let mut state = self.state.borrow_mut();
                let block = state.block_mut("RELEASE SAVEPOINT")?;
                let pos = find_savepoint(block, name)?;
                block.stack.truncate(pos);
            }
            Stmt::RollbackTo(name) => {
                let mut state = self.state.borrow_mut();
                let block = state.block_mut("ROLLBACK TO SAVEPOINT")?;
                let pos = find_savepoint(block, name)?;
                block.stack.truncate(pos + 1);
                block.data = block.stack[pos].snapshot.clone();
                block.failed = false;
            }
            Stmt::CreateTable(table) | Stmt::CreateTempTable(table) => {
                let mut state = self.state.borrow_mut();
                if state.data().contains_key(table) {
                    return Err(error(
                        "42P07",
                        &format!("relation \"{}\" already exists", table),
                    ));
                }
                state.data_mut().insert(table.clone(), Vec::new());
                if matches!(stmt, Stmt::CreateTempTable(_)) {
                    state.temporary.insert(table.clone());
                }
            }
            Stmt::Set(name, value) => {
                if name.eq_ignore_ascii_case(SETTING_ENABLED) {
                    self.session.set_setting(name, value)?;
                }
            }
            Stmt::DeclareCursor(name, table) => {
                if !self.in_block() {
                    return Err(error(
                        "25P01",
                        "DECLARE CURSOR can only be used in transaction blocks",
                    ));
                }
                let query = Stmt::Select(table.clone());
                self.chain.planner(&mut || self.plan(&query))?;
                let mut state = self.state.borrow_mut();
                let rows = state.data().get(table).cloned().unwrap_or_default();
                state.cursors.insert(name.clone(), (rows, 0));
            }
            Stmt::Fetch(name) => {
                let mut row = None;
                self.chain.executor_run(&mut || {
                    let mut state = self.state.borrow_mut();
                    let (rows, pos) = state.cursors.get_mut(name).ok_or_else(|| {
                        error("34000", &format!("cursor \"{}\" does not exist", name))
                    })?;
                    row = rows.get(*pos).copied();
                    if row.is_some() {
                        *pos += 1;
                    }
                    Ok(())
                })?;
                return Ok(Outcome {
                    rows: row.into_iter().collect(),
                });
            }
            Stmt::Close(name) => {
                let mut state = self.state.borrow_mut();
                if state.cursors.remove(name).is_none() {
                    return Err(error(
                        "34000",
                        &format!("cursor \"{}\" does not exist", name),
                    ));
                }
            }
            planned => return Err(error("XX000", &format!("{:?} is not a utility", planned))),
        }
        Ok(Outcome::default())
    }
}

fn find_savepoint(block: &Block, name: &str) -> Result<usize, RollbackError> {
    block
        .stack
        .iter()
        .rposition(|sub| sub.name.as_deref() == Some(name))
        .ok_or_else(|| no_savepoint(name))
}

/// Command tag the engine reports for a transaction-control statement
fn transaction_tag(stmt: &Stmt) -> Option<&'static str> {
    match stmt {
        Stmt::Begin => Some("BEGIN"),
        Stmt::Commit => Some("COMMIT"),
        Stmt::Rollback => Some("ROLLBACK"),
        Stmt::PrepareTransaction(_) => Some("PREPARE TRANSACTION"),
        Stmt::CommitPrepared(_) => Some("COMMIT PREPARED"),
        Stmt::RollbackPrepared(_) => Some("ROLLBACK PREPARED"),
        Stmt::Savepoint(_) => Some("SAVEPOINT"),
        Stmt::Release(_) => Some("RELEASE"),
        Stmt::RollbackTo(_) => Some("ROLLBACK TO SAVEPOINT"),
        _ => None,
    }
}

fn utility_statement(stmt: &Stmt) -> Result<UtilityStatement, RollbackError> {
    if let Some(tag) = transaction_tag(stmt) {
        let kind: TransactionKind = tag.parse()?;
        return Ok(match stmt {
            Stmt::Savepoint(name) | Stmt::Release(name) | Stmt::RollbackTo(name) => {
                UtilityStatement::savepoint_command(kind, name.clone())
            }
            _ => UtilityStatement::transaction(kind),
        });
    }

    Ok(match stmt {
        Stmt::DeclareCursor(name, _) => UtilityStatement::DeclareCursor { name: name.clone() },
        Stmt::Fetch(name) => UtilityStatement::Fetch {
            cursor: name.clone(),
        },
        Stmt::Close(name) => UtilityStatement::ClosePortal {
            cursor: Some(name.clone()),
        },
        Stmt::CreateTable(_) => UtilityStatement::other("CREATE TABLE"),
        Stmt::CreateTempTable(_) => UtilityStatement::other("CREATE TEMPORARY TABLE"),
        Stmt::Set(..) => UtilityStatement::other("SET"),
        planned => UtilityStatement::other(format!("{:?}", planned)),
    })
}
