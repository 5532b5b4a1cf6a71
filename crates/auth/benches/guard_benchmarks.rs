use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use std::sync::Arc;
use warden_auth::{
    Guard, Hs256TokenCodec, IdentityLookup, LookupError, Permission, Requirements, ResolvedRoles,
    RoleDescriptor, TokenClaims, TokenCodec, resolve_roles,
};
use warden_core::{IdentityId, Record, ValueType};
use warden_schema::{AttributeDecl, EntityDescriptor, FieldTag, ParseOptions, SchemaView, ViewKind};

/// Lookup that always finds the same row, so only guard work is measured.
struct FixedLookup(Record);

#[async_trait::async_trait]
impl IdentityLookup for FixedLookup {
    async fn find_identity(&self, _id: &IdentityId) -> Result<Option<Record>, LookupError> {
        Ok(Some(self.0.clone()))
    }
}

fn roles_with(permissions: usize) -> ResolvedRoles {
    let admin = (0..permissions).fold(RoleDescriptor::new("admin"), |r, i| {
        r.grant(Permission::new(format!("action_{i}")))
    });
    resolve_roles(&[admin, RoleDescriptor::new("client").grant("read")], None).unwrap()
}

fn base_view() -> Arc<SchemaView> {
    let descriptor = EntityDescriptor::parse(
        "User",
        vec![
            AttributeDecl::new("id", ValueType::Int)
                .tag(FieldTag::identity())
                .tag(FieldTag::base()),
            AttributeDecl::new("username", ValueType::Str).tag(FieldTag::base()),
        ],
        &ParseOptions::default(),
    )
    .unwrap();
    Arc::new(SchemaView::build(&descriptor, ViewKind::Base))
}

fn bench_role_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("role_resolution");

    for size in [8usize, 64, 512] {
        let admin = (0..size).fold(RoleDescriptor::new("admin"), |r, i| {
            r.with(Permission::new(format!("action_{i}")), i % 2 == 0)
        });
        let roles = vec![admin];
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &roles, |b, roles| {
            b.iter(|| resolve_roles(black_box(roles), None).unwrap());
        });
    }

    group.finish();
}

fn bench_check_rights(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_rights");
    let codec: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(b"bench-secret"));

    for size in [8usize, 64, 512] {
        let roles = roles_with(size);
        let required = (0..size)
            .step_by(4)
            .fold(Requirements::new().role("admin"), |r, i| {
                r.permission(Permission::new(format!("action_{i}")))
            });
        let guard = Guard::new(required, &roles, codec.clone(), base_view()).unwrap();
        let claims = TokenClaims::issue(
            IdentityId::Int(1),
            roles.granted_ids("admin").unwrap(),
            Utc::now(),
            Duration::minutes(15),
        );

        group.bench_with_input(BenchmarkId::from_parameter(size), &claims, |b, claims| {
            b.iter(|| guard.check_rights(black_box(claims)).unwrap());
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let codec: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(b"bench-secret"));
    let roles = roles_with(16);
    let guard = Guard::new(
        Requirements::new().permission("action_3").role("admin").with_identity(),
        &roles,
        codec.clone(),
        base_view(),
    )
    .unwrap();
    let now = Utc::now();
    let claims = TokenClaims::issue(
        IdentityId::Int(1),
        roles.granted_ids("admin").unwrap(),
        now,
        Duration::minutes(15),
    );
    let token = codec.encode(&claims).unwrap();
    let lookup = FixedLookup(Record::new().with("id", 1_i64).with("username", "bench"));

    c.bench_function("guard_evaluate", |b| {
        b.iter(|| {
            rt.block_on(guard.evaluate(Some(black_box(&token)), &lookup, now))
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_role_resolution,
    bench_check_rights,
    bench_evaluate
);
criterion_main!(benches);
