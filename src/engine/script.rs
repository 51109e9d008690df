// ==========================================
// OEE 损失引擎 - 脚本调用器
// ==========================================
// 职责: 执行用户编写的信号转换脚本
// 签名: fn resolve(context, value, resolver) { <脚本体> }
// 隔离: 每次调用从池中借出独立的 Rhai Engine，调用结束归还
// 缓存: 编译结果按脚本文本缓存，clear_cache() 清空
// ==========================================

use crate::config::EngineSettings;
use crate::domain::ResolverConfiguration;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const ENTRY_FN: &str = "resolve";

// ==========================================
// 脚本可见对象
// ==========================================

/// 脚本中的 `context` 参数（只读）
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub equipment: String,
    pub material: Option<String>,
    pub job: Option<String>,
}

#[derive(Debug, Clone)]
struct HandleState {
    source_id: String,
    event_type: String,
    last_value: Dynamic,
    reason: Dynamic,
    timestamp: Dynamic,
}

/// 脚本中的 `resolver` 参数（可写）
///
/// Rhai 按值传参，内部共享状态保证脚本内的修改对调用方可见
#[derive(Debug, Clone)]
pub struct ResolverHandle {
    state: Arc<Mutex<HandleState>>,
}

impl ResolverHandle {
    fn new(config: &ResolverConfiguration, last_value: Dynamic) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                source_id: config.source_id.clone(),
                event_type: config.event_type.as_str().to_string(),
                last_value,
                reason: Dynamic::UNIT,
                timestamp: Dynamic::UNIT,
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HandleState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

fn optional_string(value: &Option<String>) -> Dynamic {
    match value {
        Some(s) => Dynamic::from(s.clone()),
        None => Dynamic::UNIT,
    }
}

/// resolver 上的文本字段：未赋值或赋 () 为 None，非字符串报错
fn text_field(source_id: &str, field: &str, value: Dynamic) -> EngineResult<Option<String>> {
    if value.is_unit() {
        return Ok(None);
    }
    let type_name = value.type_name();
    value.into_string().map(Some).map_err(|_| {
        EngineError::script(
            source_id,
            format!("resolver.{} 须为字符串，实际为 {}", field, type_name),
        )
    })
}

/// 一次脚本调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    /// 脚本返回值
    pub value: serde_json::Value,
    /// 脚本设置的原因名称
    pub reason: Option<String>,
    /// 脚本设置的事件时间（优先于外部时间戳）
    pub timestamp: Option<DateTime<Utc>>,
    /// 调用结束时的增量基线
    pub last_value: Option<serde_json::Value>,
}

// ==========================================
// ScriptInvoker
// ==========================================
pub struct ScriptInvoker {
    pool: Mutex<Vec<Engine>>,
    pool_size: usize,
    max_operations: u64,
    compiled: DashMap<String, Arc<AST>>,
}

impl ScriptInvoker {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            pool: Mutex::new(Vec::with_capacity(settings.script_pool_size)),
            pool_size: settings.script_pool_size,
            max_operations: settings.script_max_operations,
            compiled: DashMap::new(),
        }
    }

    fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.on_print(|text| debug!(output = text, "脚本输出"));

        engine
            .register_type_with_name::<ScriptContext>("Context")
            .register_get("equipment", |ctx: &mut ScriptContext| ctx.equipment.clone())
            .register_get("material", |ctx: &mut ScriptContext| {
                optional_string(&ctx.material)
            })
            .register_get("job", |ctx: &mut ScriptContext| optional_string(&ctx.job));

        engine
            .register_type_with_name::<ResolverHandle>("Resolver")
            .register_get("source_id", |h: &mut ResolverHandle| {
                h.with_state(|s| s.source_id.clone())
            })
            .register_get("event_type", |h: &mut ResolverHandle| {
                h.with_state(|s| s.event_type.clone())
            })
            .register_get_set(
                "last_value",
                |h: &mut ResolverHandle| h.with_state(|s| s.last_value.clone()),
                |h: &mut ResolverHandle, value: Dynamic| h.with_state(|s| s.last_value = value),
            )
            .register_get_set(
                "reason",
                |h: &mut ResolverHandle| h.with_state(|s| s.reason.clone()),
                |h: &mut ResolverHandle, reason: Dynamic| h.with_state(|s| s.reason = reason),
            )
            .register_get_set(
                "timestamp",
                |h: &mut ResolverHandle| h.with_state(|s| s.timestamp.clone()),
                |h: &mut ResolverHandle, ts: Dynamic| h.with_state(|s| s.timestamp = ts),
            );

        engine
    }

    fn checkout(&self) -> Engine {
        self.pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_else(|| self.build_engine())
    }

    fn give_back(&self, engine: Engine) {
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < self.pool_size {
                pool.push(engine);
            }
        }
    }

    fn compile(&self, engine: &Engine, config: &ResolverConfiguration) -> EngineResult<Arc<AST>> {
        if let Some(ast) = self.compiled.get(&config.script) {
            return Ok(Arc::clone(ast.value()));
        }

        let source = format!(
            "fn {}(context, value, resolver) {{\n{}\n}}",
            ENTRY_FN, config.script
        );
        let ast = engine
            .compile(&source)
            .map_err(|e| EngineError::script(&config.source_id, format!("编译失败: {}", e)))?;
        let ast = Arc::new(ast);
        self.compiled
            .insert(config.script.clone(), Arc::clone(&ast));
        Ok(ast)
    }

    /// 执行脚本
    ///
    /// # 参数
    /// - last_value: 本信号当前的增量基线，脚本可通过 resolver.last_value 读写
    pub fn invoke(
        &self,
        config: &ResolverConfiguration,
        context: ScriptContext,
        value: &serde_json::Value,
        last_value: Option<&serde_json::Value>,
    ) -> EngineResult<ScriptOutcome> {
        if !config.has_script() {
            return Err(EngineError::script(&config.source_id, "脚本为空"));
        }

        let engine = self.checkout();
        let result = self.run(&engine, config, context, value, last_value);
        self.give_back(engine);
        result
    }

    fn run(
        &self,
        engine: &Engine,
        config: &ResolverConfiguration,
        context: ScriptContext,
        value: &serde_json::Value,
        last_value: Option<&serde_json::Value>,
    ) -> EngineResult<ScriptOutcome> {
        let source_id = config.source_id.as_str();
        let ast = self.compile(engine, config)?;

        let input = rhai::serde::to_dynamic(value)
            .map_err(|e| EngineError::script(source_id, format!("输入值无法转换: {}", e)))?;
        let baseline = match last_value {
            Some(v) => rhai::serde::to_dynamic(v)
                .map_err(|e| EngineError::script(source_id, format!("基线值无法转换: {}", e)))?,
            None => Dynamic::UNIT,
        };
        let handle = ResolverHandle::new(config, baseline);

        let output: Dynamic = engine
            .call_fn(
                &mut Scope::new(),
                &ast,
                ENTRY_FN,
                (context, input, handle.clone()),
            )
            .map_err(|e| EngineError::script(source_id, format!("执行失败: {}", e)))?;

        let value = rhai::serde::from_dynamic::<serde_json::Value>(&output).map_err(|e| {
            EngineError::script(
                source_id,
                format!("返回值形态不符 ({}): {}", output.type_name(), e),
            )
        })?;

        let state = handle.with_state(|s| s.clone());
        let reason = text_field(source_id, "reason", state.reason)?;
        let timestamp = match text_field(source_id, "timestamp", state.timestamp)? {
            Some(ts) => Some(
                DateTime::parse_from_rfc3339(&ts)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        EngineError::script(source_id, format!("时间戳格式错误 '{}': {}", ts, e))
                    })?,
            ),
            None => None,
        };
        let last_value = if state.last_value.is_unit() {
            None
        } else {
            Some(
                rhai::serde::from_dynamic::<serde_json::Value>(&state.last_value).map_err(
                    |e| EngineError::script(source_id, format!("基线值形态不符: {}", e)),
                )?,
            )
        };

        Ok(ScriptOutcome {
            value,
            reason,
            timestamp,
            last_value,
        })
    }

    /// 清空编译缓存（脚本修改后调用）
    pub fn clear_cache(&self) {
        self.compiled.clear();
    }

    pub fn cached_scripts(&self) -> usize {
        self.compiled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use chrono::TimeZone;
    use serde_json::json;

    fn invoker() -> ScriptInvoker {
        ScriptInvoker::new(&EngineSettings::default())
    }

    fn context() -> ScriptContext {
        ScriptContext {
            equipment: "Line-1".to_string(),
            material: Some("Widget".to_string()),
            job: None,
        }
    }

    fn config(script: &str) -> ResolverConfiguration {
        ResolverConfiguration::new("counter.good", "Line-1", EventType::ProdGood, script)
    }

    #[test]
    fn test_delta_script_updates_baseline() {
        let cfg = config(
            "let delta = value - resolver.last_value; resolver.last_value = value; delta",
        );
        let outcome = invoker()
            .invoke(&cfg, context(), &json!(142), Some(&json!(100)))
            .unwrap();
        assert_eq!(outcome.value, json!(42));
        assert_eq!(outcome.last_value, Some(json!(142)));
    }

    #[test]
    fn test_context_is_visible_to_script() {
        let cfg = config("context.equipment + \"/\" + context.material + \"/\" + type_of(context.job)");
        let outcome = invoker().invoke(&cfg, context(), &json!(null), None).unwrap();
        assert_eq!(outcome.value, json!("Line-1/Widget/()"));
    }

    #[test]
    fn test_reason_and_timestamp_set_by_script() {
        let cfg = config(
            "resolver.reason = \"Jam\"; resolver.timestamp = \"2026-03-02T08:15:00Z\"; value",
        );
        let outcome = invoker().invoke(&cfg, context(), &json!("DOWN"), None).unwrap();
        assert_eq!(outcome.reason.as_deref(), Some("Jam"));
        assert_eq!(
            outcome.timestamp,
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 8, 15, 0).unwrap())
        );
        assert_eq!(outcome.value, json!("DOWN"));
    }

    #[test]
    fn test_empty_script_is_script_error() {
        let err = invoker()
            .invoke(&config("   "), context(), &json!(1), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Script { .. }));
    }

    #[test]
    fn test_thrown_error_is_script_error() {
        let err = invoker()
            .invoke(&config("throw \"sensor offline\""), context(), &json!(1), None)
            .unwrap_err();
        match err {
            EngineError::Script { source_id, message } => {
                assert_eq!(source_id, "counter.good");
                assert!(message.contains("sensor offline"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_string_reason_is_script_error() {
        for script in [
            "resolver.reason = 42; value",
            "resolver.timestamp = [2026, 3, 2]; value",
        ] {
            let err = invoker()
                .invoke(&config(script), context(), &json!(1), None)
                .unwrap_err();
            match err {
                EngineError::Script { message, .. } => assert!(message.contains("须为字符串")),
                other => panic!("unexpected error: {:?}", other),
            }
        }

        // 读回已赋的值，赋 () 视为清除
        let outcome = invoker()
            .invoke(
                &config("resolver.reason = \"Jam\"; let r = resolver.reason; resolver.reason = (); r"),
                context(),
                &json!(1),
                None,
            )
            .unwrap();
        assert_eq!(outcome.value, json!("Jam"));
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_bad_timestamp_is_script_error() {
        let cfg = config("resolver.timestamp = \"yesterday\"; value");
        let err = invoker().invoke(&cfg, context(), &json!(1), None).unwrap_err();
        assert!(matches!(err, EngineError::Script { .. }));
    }

    #[test]
    fn test_runaway_script_hits_operation_budget() {
        let settings = EngineSettings {
            script_max_operations: 1_000,
            ..EngineSettings::default()
        };
        let invoker = ScriptInvoker::new(&settings);
        let err = invoker
            .invoke(&config("let n = 0; loop { n += 1; }"), context(), &json!(1), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Script { .. }));
    }

    #[test]
    fn test_compiled_scripts_are_cached_and_cleared() {
        let invoker = invoker();
        let cfg = config("value * 2");
        for _ in 0..3 {
            invoker.invoke(&cfg, context(), &json!(21), None).unwrap();
        }
        assert_eq!(invoker.cached_scripts(), 1);
        invoker.clear_cache();
        assert_eq!(invoker.cached_scripts(), 0);
    }
}
