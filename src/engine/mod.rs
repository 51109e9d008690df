// ==========================================
// OEE 损失引擎 - 引擎层
// ==========================================
// 职责: 事件解析、损失累加、瀑布计算、帕累托排序
// 红线: Engine 不拼 SQL，数据读写全部经由 repository 的 Trait
// ==========================================

pub mod accumulator;
pub mod cache;
pub mod context;
pub mod error;
pub mod pareto;
pub mod registry;
pub mod resolver;
pub mod script;
pub mod waterfall;

// 重导出核心引擎
pub use accumulator::LossAccumulator;
pub use cache::NameCache;
pub use context::{EquipmentContext, ExecutionContext, InMemoryExecutionContext};
pub use error::{EngineError, EngineResult};
pub use pareto::{category_pareto, reason_pareto, sort_descending, ParetoItem};
pub use registry::ResolverRegistry;
pub use resolver::EventResolver;
pub use script::{ScriptContext, ScriptInvoker, ScriptOutcome};
pub use waterfall::LossWaterfallCalculator;
