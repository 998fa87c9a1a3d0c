//! # Noema Agent
//!
//! Agent state machine for Noema. Each agent is a slot in a dense arena with
//! an owner, a status, an execution balance and a delegated logic target.
//!
//! ## Components
//!
//! - [`AgentRegistry`]: lifecycle, balances and gas-metered action execution
//! - [`CircuitBreaker`]: global, per-entity and per-logic pause flags
//! - [`LogicRegistry`]: upgradeable behaviour table behind stable logic addresses
//! - [`AgentRuntime`]: wires the agent and learning components together

pub mod balance;
pub mod breaker;
pub mod logic;
pub mod registry;
pub mod runtime;
pub mod table;

pub use balance::{Balance, PayoutBook};
pub use breaker::CircuitBreaker;
pub use logic::{AgentLogic, ExecutionContext, GasMeter, LogicRegistry};
pub use registry::{ActionReceipt, AgentRegistry};
pub use runtime::{AgentRuntime, RuntimeBuilder, Specialization};
pub use table::{AgentRecord, AgentSlot, EntityTable};
