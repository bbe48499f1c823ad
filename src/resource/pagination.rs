use serde::Deserialize;
use serde_json::{Map, Value};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use utoipa::IntoParams;

use crate::config::DispatcherConfig;
use crate::database::Record;

/// Pagination query parameters of the index verb.
///
/// Values may arrive as numbers (JSON bodies) or strings (query strings).
#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Offset of the first row before `page` is applied.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[param(example = 0)]
    pub from: Option<u64>,
    /// Page size, capped by the dispatcher's `max_take`.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[param(example = 10)]
    pub take: Option<u64>,
    /// 1-based page number; moves `from` forward by `take * (page - 1)`.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[param(example = 1)]
    pub page: Option<u64>,
}

/// Effective offset and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl PageParams {
    /// Reads `from`, `take` and `page` out of a request bag; unreadable
    /// values are ignored.
    #[must_use]
    pub fn from_input(input: &Record) -> Self {
        let field = |name: &str| -> Option<u64> {
            let value = input.get(name)?;
            let mut single = Map::new();
            single.insert(name.to_string(), value.clone());
            serde_json::from_value::<PageParams>(Value::Object(single))
                .ok()
                .and_then(|params| match name {
                    "from" => params.from,
                    "take" => params.take,
                    _ => params.page,
                })
        };

        Self {
            from: field("from"),
            take: field("take"),
            page: field("page"),
        }
    }

    #[must_use]
    pub fn resolve(&self, config: &DispatcherConfig) -> Page {
        let limit = self
            .take
            .unwrap_or(config.default_take)
            .min(config.max_take);
        let page = self.page.unwrap_or(1).max(1);
        let offset = self
            .from
            .unwrap_or(0)
            .saturating_add(limit.saturating_mul(page - 1));
        Page { offset, limit }
    }
}
