//! Page filters (C1): stateless predicates deciding per-page flush
//! policy for each checkpoint kind and for background pacing. Grounded
//! on `filter_flush_data_file_{indirect,medium,full,evenly}` in
//! `ma_checkpoint.c`.

use crate::{collaborators::PageType, lsn::Lsn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Skip = 0,
    Flush = 1,
    SkipAndStop = 2,
}

/// Parameters shared by every filter. `max_pages` is mutated in place
/// by `Evenly` — callers treat it as a budget consumed across
/// sequential pages.
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    pub up_to_lsn: Lsn,
    pub pages_covered_by_bitmap: u32,
    pub is_data_file: bool,
    pub max_pages: u32,
}

impl FilterParams {
    pub fn new(is_data_file: bool, pages_covered_by_bitmap: u32) -> Self {
        FilterParams {
            up_to_lsn: Lsn::IMPOSSIBLE,
            pages_covered_by_bitmap,
            is_data_file,
            max_pages: 0,
        }
    }
}

/// Page number `p` is a bitmap page of a data file iff `p mod
/// pages_covered_by_bitmap == 0` for that file's bitmap density.
pub fn is_bitmap_page(page_no: u64, pages_covered_by_bitmap: u32) -> bool {
    pages_covered_by_bitmap != 0 && page_no % pages_covered_by_bitmap as u64 == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFilter {
    Medium,
    Full,
    Indirect,
    Evenly,
}

impl PageFilter {
    pub fn apply(
        &self,
        page_type: PageType,
        page_no: u64,
        rec_lsn: Lsn,
        params: &mut FilterParams,
    ) -> FilterDecision {
        match self {
            PageFilter::Medium => filter_medium(page_type, page_no, rec_lsn, params),
            PageFilter::Full => filter_full(page_type, page_no, rec_lsn, params),
            PageFilter::Indirect => filter_indirect(page_type, page_no, rec_lsn, params),
            PageFilter::Evenly => filter_evenly(page_type, page_no, rec_lsn, params),
        }
    }
}

fn is_bitmap(page_no: u64, params: &FilterParams) -> bool {
    params.is_data_file && is_bitmap_page(page_no, params.pages_covered_by_bitmap)
}

fn filter_medium(
    page_type: PageType,
    page_no: u64,
    rec_lsn: Lsn,
    params: &FilterParams,
) -> FilterDecision {
    let lsn_hit = page_type.is_lsn_page() && rec_lsn <= params.up_to_lsn;
    if lsn_hit || is_bitmap(page_no, params) {
        FilterDecision::Flush
    } else {
        FilterDecision::Skip
    }
}

fn filter_full(
    page_type: PageType,
    page_no: u64,
    _rec_lsn: Lsn,
    params: &FilterParams,
) -> FilterDecision {
    if page_type.is_lsn_page() || is_bitmap(page_no, params) {
        FilterDecision::Flush
    } else {
        FilterDecision::Skip
    }
}

fn filter_indirect(
    _page_type: PageType,
    page_no: u64,
    _rec_lsn: Lsn,
    params: &FilterParams,
) -> FilterDecision {
    if is_bitmap(page_no, params) {
        FilterDecision::Flush
    } else {
        FilterDecision::Skip
    }
}

fn filter_evenly(
    page_type: PageType,
    _page_no: u64,
    rec_lsn: Lsn,
    params: &mut FilterParams,
) -> FilterDecision {
    if params.max_pages == 0 {
        return FilterDecision::SkipAndStop;
    }
    if page_type.is_lsn_page() && rec_lsn <= params.up_to_lsn {
        params.max_pages -= 1;
        return FilterDecision::Flush;
    }
    FilterDecision::Skip
}
