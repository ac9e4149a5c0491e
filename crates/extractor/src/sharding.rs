use common::{ExtractionRequest, ShardTask, TimeWindow};

/// Split a half-open window into consecutive half-open pieces no longer than
/// `max_span_ms`. The pieces cover the input exactly, in ascending order.
pub fn split_window(window: TimeWindow, max_span_ms: u64) -> Vec<TimeWindow> {
    let step = i64::try_from(max_span_ms.max(1)).unwrap_or(i64::MAX);
    let mut pieces = Vec::new();
    let mut start = window.start_ms;
    while start < window.end_ms {
        let end = start.saturating_add(step).min(window.end_ms);
        pieces.push(TimeWindow { start_ms: start, end_ms: end });
        start = end;
    }
    pieces
}

/// One shard per symbol, or one per sub-window when the request's window is
/// wider than the exchange accepts. Output order follows symbol order, then
/// window order.
pub fn plan_shards(request: &ExtractionRequest, max_span_ms: u64) -> Vec<ShardTask> {
    let windows: Vec<Option<TimeWindow>> = match request.window() {
        Some(w) => split_window(w, max_span_ms).into_iter().map(Some).collect(),
        None => vec![None],
    };

    request
        .symbols()
        .iter()
        .flat_map(|symbol| {
            windows
                .iter()
                .enumerate()
                .map(move |(i, w)| ShardTask::new(symbol.clone(), i, *w))
        })
        .collect()
}
