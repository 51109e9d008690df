// ==========================================
// OEE 损失引擎 - 命令行入口
// ==========================================
// 用法:
//   oee-loss-engine [db_path] <equipment> <from> <to>
//
// from/to 为 RFC3339 时间；db_path 缺省时取 OEE_ENGINE_DB_PATH 或用户数据目录。
// 输出: 损失瀑布汇总 + 真实损失帕累托（JSON，stdout）
// ==========================================

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use oee_loss_engine::{db, logging, OeeApi};
use serde_json::json;

fn parse_time(label: &str, raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("{} 不是合法的 RFC3339 时间: {}", label, raw))?;
    Ok(parsed.with_timezone(&Utc))
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, rest) = match args.len() {
        3 => (db::default_db_path(), &args[..]),
        4 => (args[0].clone(), &args[1..]),
        _ => bail!("用法: oee-loss-engine [db_path] <equipment> <from> <to>"),
    };

    let equipment = rest[0].as_str();
    let from = parse_time("from", &rest[1])?;
    let to = parse_time("to", &rest[2])?;

    tracing::info!("{} v{}", oee_loss_engine::APP_NAME, oee_loss_engine::VERSION);
    tracing::info!(db_path = %db_path, "使用数据库");

    let api = OeeApi::open(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    let summary = api.calculate_losses(equipment, from, to)?;
    let pareto = api.loss_pareto(equipment, from, to, None)?;

    let report = json!({
        "summary": summary,
        "pareto": pareto,
        "pareto_unit": api.settings().pareto_time_unit,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
