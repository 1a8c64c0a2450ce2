// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use apilens_index::{MatcherConfig, PatternMatcher, SearchOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_search(c: &mut Criterion) {
    let matcher = PatternMatcher::new(MatcherConfig::default()).unwrap();
    let options = SearchOptions::new().min_similarity(0.0);

    c.bench_function("search_default_catalog", |b| {
        b.iter(|| {
            matcher
                .search(
                    black_box("GET /api/users?page=2&limit=50 Authorization: Bearer abc"),
                    &options,
                )
                .unwrap()
        })
    });

    c.bench_function("pattern_analytics", |b| {
        b.iter(|| matcher.pattern_analytics().unwrap())
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
