//! 汇总：遍历存储，累加所有已有推荐的资源的当前成本与可节省金额
//!
//! 每次全量重算，不做增量记账；结果最终一致。

use serde::Serialize;

use crate::pipeline::snapshot::format_price;
use crate::pipeline::ResourceStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total_cost: f64,
    pub total_savings: f64,
    /// 计入汇总的资源数（有推荐的）
    pub resources: usize,
    pub message: String,
}

impl ResultSummary {
    pub fn new(total_cost: f64, total_savings: f64, resources: usize) -> Self {
        Self {
            total_cost,
            total_savings,
            resources,
            message: format!(
                "Current runtime cost: {}, Savings: {}",
                format_price(total_cost),
                format_price(total_savings)
            ),
        }
    }
}

pub async fn aggregate(store: &ResourceStore) -> ResultSummary {
    let mut total_cost = 0.0;
    let mut total_savings = 0.0;
    let mut resources = 0;
    store
        .range(|_, snapshot| {
            if let Some(rec) = &snapshot.recommendation {
                total_cost += rec.current_cost();
                total_savings += rec.savings();
                resources += 1;
            }
            true
        })
        .await;
    ResultSummary::new(total_cost, total_savings, resources)
}
