use serde::Serialize;

const MAX_LIMIT: i64 = 1000;

pub(crate) const fn default_limit() -> i64 {
    100
}

/// `?skip=&limit=` as sent by the review UI; out-of-range values are clamped, not rejected.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageParams {
    skip: i64,
    limit: i64,
}

impl PageParams {
    pub(crate) fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }

    pub(crate) fn skip(&self) -> i64 {
        self.skip.max(0)
    }

    pub(crate) fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub(crate) fn wrap<T>(&self, items: Vec<T>, total_count: i64) -> PaginatedResponse<T> {
        PaginatedResponse { items, total_count, skip: self.skip(), limit: self.limit() }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_values_are_clamped() {
        let wild = PageParams::new(-5, 50_000);
        assert_eq!((wild.skip(), wild.limit()), (0, 1000));
        assert_eq!(PageParams::new(0, 0).limit(), 1);

        let page = PageParams::new(20, default_limit()).wrap(vec!["a"], 21);
        assert_eq!((page.skip, page.limit, page.total_count), (20, 100, 21));
    }
}
