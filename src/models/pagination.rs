//! Offset/limit listing parameters shared by the list endpoints.

use serde::Deserialize;

/// Skip/limit query parameters with server-side clamping.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ListParams {
    const MAX_LIMIT: i64 = 500;
    const DEFAULT_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = ListParams::default();
        assert_eq!(p.limit(), 100);
        assert_eq!(p.skip(), 0);
    }

    #[test]
    fn clamps_limit_and_skip() {
        let p = ListParams {
            skip: Some(-5),
            limit: Some(10_000),
        };
        assert_eq!(p.limit(), 500);
        assert_eq!(p.skip(), 0);
    }
}
