//! Benchmarks for the hot paths of the issuance pipeline: fingerprint
//! computation and sequence allocation.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use fiscalio_core::{AggregateId, Money, Percentage, TenantId, UserId};
use fiscalio_infra::{InMemoryInvoiceStore, InMemorySequenceAllocator, IssuanceService};
use fiscalio_invoicing::{ClientId, DraftInvoice, InvoiceId, LineItem, LineItemKind};
use fiscalio_ledger::{compute_fingerprint, ChainInput};
use fiscalio_numbering::{SequenceAllocator, Series};

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

fn chain_input(tenant_id: TenantId) -> ChainInput {
    ChainInput {
        tenant_id,
        number: "F-2026-000123".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        taxable_base: money("100.00"),
        tax_total: money("21.00"),
        grand_total: money("121.00"),
        client_tax_id: "B12345678".to_string(),
    }
}

fn bench_fingerprint(c: &mut Criterion) {
    let input = chain_input(TenantId::new());
    let previous = compute_fingerprint(&input, None);

    c.bench_function("fingerprint_head", |b| {
        b.iter(|| compute_fingerprint(black_box(&input), None))
    });
    c.bench_function("fingerprint_linked", |b| {
        b.iter(|| compute_fingerprint(black_box(&input), Some(previous.as_str())))
    });
}

fn bench_allocation(c: &mut Criterion) {
    let allocator = InMemorySequenceAllocator::new();
    let tenant_id = TenantId::new();
    let series = Series::new("F").unwrap();

    c.bench_function("allocate_in_memory", |b| {
        b.iter(|| allocator.allocate(black_box(tenant_id), &series, 2026).unwrap())
    });
}

fn bench_issue_pipeline(c: &mut Criterion) {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let allocator = Arc::new(InMemorySequenceAllocator::new());
    let service = IssuanceService::new(store, allocator);
    let tenant_id = TenantId::new();
    let user_id = UserId::new();
    let issue_date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

    let line = LineItem::new(
        LineItemKind::Labor,
        "Workshop hour",
        Decimal::ONE,
        money("100.00"),
        Percentage::new(Decimal::from(21)).unwrap(),
    )
    .unwrap();

    c.bench_function("issue_end_to_end", |b| {
        b.iter(|| {
            let draft = service
                .create_draft(DraftInvoice {
                    id: InvoiceId::new(AggregateId::new()),
                    tenant_id,
                    client_id: ClientId::new(AggregateId::new()),
                    client_tax_id: "B12345678".to_string(),
                    source_order_id: None,
                    series: Series::new("F").unwrap(),
                    due_date: None,
                    withholding_percent: Percentage::zero(),
                    lines: vec![line.clone()],
                    created_by: user_id,
                    created_at: Utc::now(),
                })
                .unwrap();
            service
                .issue(tenant_id, draft.id_typed(), user_id, issue_date)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_allocation,
    bench_issue_pipeline
);
criterion_main!(benches);
