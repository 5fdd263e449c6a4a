use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use weft::analyzer::{LanguageAnalyzer, PythonAnalyzer};
use weft::config::Config;
use weft::warn::TestClassifier;

/// Generate a realistic Python module with imports, calls, classes, and
/// guarded imports so every detector and the warning scan get exercised.
fn make_python_file(index: usize) -> String {
    format!(
        r#"
import os
import sys
from shared import helper_{i}, OTHER_CONSTANT
from typing import TYPE_CHECKING

if TYPE_CHECKING:
    from shared import TypeOnly_{i}

CONSTANT_{i} = {i}

def local_worker_{i}(x, y):
    result = helper_{i}(x) + y
    return result

class Service_{i}:
    def __init__(self, value):
        self.value = value

    def compute(self):
        helper_{i}(self.value)
        return os.path.join("a", "b")

def dispatch_{i}(obj, name):
    return getattr(obj, name)()

service_{i} = Service_{i}(CONSTANT_{i})
local_worker_{i}(1, 2)
print(sys.version)
"#,
        i = index
    )
}

fn bench_analyze(c: &mut Criterion) {
    // A temp tree with a resolvable `shared.py` so imports hit the
    // project-file path, not just the stdlib tags.
    let dir = TempDir::new().unwrap();
    let mut shared = String::new();
    for i in 0..50 {
        shared.push_str(&format!("def helper_{i}(x):\n    return x\n"));
    }
    shared.push_str("OTHER_CONSTANT = 1\n");
    fs::write(dir.path().join("shared.py"), shared).unwrap();

    let analyzer = PythonAnalyzer::new(
        dir.path(),
        Config::default(),
        Arc::new(TestClassifier::new(vec![])),
    );
    let sources: Vec<(String, String)> = (0..50)
        .map(|i| (format!("mod_{i}.py"), make_python_file(i)))
        .collect();

    c.bench_function("analyze_50_modules", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for (name, source) in &sources {
                let outcome = analyzer.analyze(name, source.as_bytes());
                total += outcome.relationships.len();
            }
            black_box(total)
        })
    });

    let big: String = make_python_file(0).repeat(200);
    c.bench_function("analyze_large_module", |b| {
        b.iter(|| {
            let outcome = analyzer.analyze("big_mod.py", big.as_bytes());
            black_box(outcome.relationships.len())
        })
    });
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
