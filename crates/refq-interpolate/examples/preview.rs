use refq_interpolate::{InterpolatedQuery, Interpolator};
use refq_registry::{QueryRecord, QueryRegistry};
use tracing_subscriber::EnvFilter;

/// Wraps every interpolated range in brackets so pulled-in text stands out.
fn highlight(q: &InterpolatedQuery) -> String {
    let chars: Vec<char> = q.expr.chars().collect();
    let mut marks = vec![(0usize, 0usize); chars.len() + 1];
    for i in &q.interpolations {
        let r = i.range();
        if r.end <= chars.len() {
            marks[r.start].0 += 1;
            marks[r.end].1 += 1;
        }
    }
    let mut out = String::new();
    for (idx, (opens, closes)) in marks.iter().enumerate() {
        out.extend(std::iter::repeat(']').take(*closes));
        out.extend(std::iter::repeat('[').take(*opens));
        if let Some(c) = chars.get(idx) {
            out.push(*c);
        }
    }
    out
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let registry: QueryRegistry = vec![
        QueryRecord::new("A", "sum(rate(http_requests_total[5m]))"),
        QueryRecord::new("B", "sum(rate(http_errors_total[5m]))"),
        QueryRecord::new("C", "@B / @A"),
        QueryRecord::new("D", "@C * 100"),
        QueryRecord::new("E", "@E + 1"),
    ]
    .into_iter()
    .collect();

    for (ref_id, result) in Interpolator::new(&registry).interpolate_all() {
        match result {
            Ok(q) => println!("{ref_id}: {}", highlight(&q)),
            Err(e) => println!("{ref_id}: error: {e}"),
        }
    }
}
