//! End-to-end cost rollup tests: persisted BOM chains resolved from the
//! database and priced by the calculator, including the policy that prefers
//! sub-BOM rollups over stored component prices.

mod common;

use axum::http::{Method, StatusCode};
use bomworks_api::services::boms::BomComponentInput;
use bomworks_api::services::costing::{self, CostBreakdown, WarningKind};
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{bom_input, component, decimal_field, response_json, TestApp};

fn component_cost<'a>(breakdown: &'a CostBreakdown, product: Uuid) -> &'a costing::ComponentCost {
    breakdown
        .components
        .iter()
        .find(|c| c.component_product_id == product)
        .expect("expected a cost line for product")
}

/// Seed the three-level bakery chain used throughout: raw wheat into flour,
/// flour into cake, cake into wedding cake. Stored unit costs for sub-BOM
/// lines are deliberately stale so inheritance is observable.
async fn seed_bakery(app: &TestApp) -> (Uuid, Uuid, Uuid) {
    let flour = app.seed_product("FLOUR", "Wheat flour").await;
    let wheat = app.seed_product("WHEAT", "Raw wheat").await;
    let cake = app.seed_product("CAKE", "Cake").await;
    let sugar = app.seed_product("SUGAR", "Sugar").await;
    let eggs = app.seed_product("EGGS", "Eggs").await;
    let wedding = app.seed_product("WED-CAKE", "Wedding cake").await;
    let icing = app.seed_product("ICING", "Icing").await;
    let decorations = app.seed_product("DECOR", "Decorations").await;

    let mut flour_input = bom_input(
        flour,
        "Wheat flour, milled",
        vec![component(wheat, dec!(1), dec!(2.00))],
    );
    flour_input.status = Some(bomworks_api::entities::bom_header::BomStatus::Active);
    flour_input.labor_cost = Some(dec!(0.50));
    flour_input.overhead_cost = Some(dec!(0.30));
    app.state
        .services
        .boms
        .create_bom(flour_input)
        .await
        .expect("seed flour bom");

    let mut cake_input = bom_input(
        cake,
        "Cake",
        vec![
            component(flour, dec!(1), dec!(2.50)),
            component(sugar, dec!(1), dec!(1.20)),
            component(eggs, dec!(1), dec!(3.00)),
        ],
    );
    cake_input.status = Some(bomworks_api::entities::bom_header::BomStatus::Active);
    cake_input.labor_cost = Some(dec!(2.50));
    app.state
        .services
        .boms
        .create_bom(cake_input)
        .await
        .expect("seed cake bom");

    let mut wedding_input = bom_input(
        wedding,
        "Wedding cake",
        vec![
            component(cake, dec!(1), dec!(9.00)),
            component(icing, dec!(1), dec!(2.00)),
            component(decorations, dec!(1), dec!(1.50)),
        ],
    );
    wedding_input.status = Some(bomworks_api::entities::bom_header::BomStatus::Active);
    wedding_input.labor_cost = Some(dec!(1.00));
    app.state
        .services
        .boms
        .create_bom(wedding_input)
        .await
        .expect("seed wedding cake bom");

    (flour, cake, wedding)
}

#[tokio::test]
async fn bakery_chain_reproduces_catalog_costs() {
    let app = TestApp::new().await;
    let (flour, cake, wedding) = seed_bakery(&app).await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(wedding, None)
        .await
        .expect("resolve wedding cake");
    let breakdown = costing::compute_cost(&tree);

    assert_eq!(breakdown.total_cost, dec!(14.00));
    assert_eq!(breakdown.effective_unit_cost, dec!(14.00));
    assert!(breakdown.warnings.is_empty());

    let cake_line = component_cost(&breakdown, cake);
    assert!(cake_line.cost_inherited);
    assert_eq!(cake_line.effective_unit_cost, dec!(9.50));
    let cake_breakdown = cake_line.sub_bom.as_ref().expect("cake breakdown");
    assert_eq!(cake_breakdown.total_cost, dec!(9.50));
    assert_eq!(cake_breakdown.material_cost, dec!(7.00));
    assert_eq!(cake_breakdown.labor_cost, dec!(2.50));

    let flour_line = component_cost(cake_breakdown, flour);
    assert!(flour_line.cost_inherited);
    assert_eq!(flour_line.effective_unit_cost, dec!(2.80));
    let flour_breakdown = flour_line.sub_bom.as_ref().expect("flour breakdown");
    assert_eq!(flour_breakdown.total_cost, dec!(2.80));
}

#[tokio::test]
async fn leaf_unit_costs_round_trip_exactly() {
    let app = TestApp::new().await;
    let flour = app.seed_product("FLOUR-RT", "Wheat flour").await;
    let wheat = app.seed_product("WHEAT-RT", "Raw wheat").await;
    let bag = app.seed_product("BAG-RT", "Paper bag").await;

    app.seed_active_bom(
        flour,
        "Wheat flour",
        vec![
            component(wheat, dec!(1), dec!(2.00)),
            component(bag, dec!(1), dec!(0.30)),
        ],
    )
    .await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(flour, None)
        .await
        .expect("resolve flour");
    let breakdown = costing::compute_cost(&tree);

    let wheat_line = component_cost(&breakdown, wheat);
    assert!(!wheat_line.cost_inherited);
    assert_eq!(wheat_line.effective_unit_cost, dec!(2.00));
    let bag_line = component_cost(&breakdown, bag);
    assert!(!bag_line.cost_inherited);
    assert_eq!(bag_line.effective_unit_cost, dec!(0.30));
    assert_eq!(breakdown.material_cost, dec!(2.30));
}

#[tokio::test]
async fn waste_inflates_effective_quantity_and_cost() {
    let app = TestApp::new().await;
    let flour = app.seed_product("FLOUR-W", "Wheat flour").await;
    let wheat = app.seed_product("WHEAT-W", "Raw wheat").await;

    app.seed_active_bom(
        flour,
        "Wheat flour",
        vec![BomComponentInput {
            waste_percentage: Some(dec!(10)),
            ..component(wheat, dec!(0.5), dec!(2.00))
        }],
    )
    .await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(flour, None)
        .await
        .expect("resolve flour");
    let breakdown = costing::compute_cost(&tree);

    let wheat_line = component_cost(&breakdown, wheat);
    assert_eq!(wheat_line.quantity_with_waste, dec!(0.55));
    assert_eq!(wheat_line.total_cost, dec!(1.10));
    assert_eq!(breakdown.total_cost, dec!(1.10));
}

#[tokio::test]
async fn rollup_overrides_stale_submitted_prices_but_cache_keeps_them() {
    let app = TestApp::new().await;
    let (flour, cake, _) = seed_bakery(&app).await;

    // The stored cake header was priced from the submitted figures, flour at
    // its stale 2.50.
    let (summaries, _) = app
        .state
        .services
        .boms
        .list_boms(Some(cake), None, 1, 10)
        .await
        .expect("list cake boms");
    assert_eq!(summaries[0].total_cost, dec!(9.20));

    // The calculator prices flour from its own BOM instead.
    let tree = app
        .state
        .services
        .resolver
        .resolve_product(cake, None)
        .await
        .expect("resolve cake");
    let breakdown = costing::compute_cost(&tree);
    assert_eq!(breakdown.total_cost, dec!(9.50));
    assert_eq!(component_cost(&breakdown, flour).effective_unit_cost, dec!(2.80));
}

#[tokio::test]
async fn rollup_warns_but_completes_on_cycles() {
    let app = TestApp::new().await;
    let alpha = app.seed_product("CY-A", "Assembly alpha").await;
    let beta = app.seed_product("CY-B", "Assembly beta").await;

    app.seed_active_bom(alpha, "Alpha", vec![component(beta, dec!(1), dec!(5.00))])
        .await;
    app.seed_active_bom(beta, "Beta", vec![component(alpha, dec!(1), dec!(4.00))])
        .await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(alpha, None)
        .await
        .expect("resolution terminates");
    let breakdown = costing::compute_cost(&tree);

    assert!(breakdown
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::CycleDetected));

    // Beta's alpha line was cut; it prices at its stored 4.00, so beta rolls
    // up to 4.00 and alpha to exactly that plus nothing else.
    let beta_line = component_cost(&breakdown, beta);
    assert!(beta_line.cost_inherited);
    assert_eq!(beta_line.effective_unit_cost, dec!(4.00));
    assert_eq!(breakdown.total_cost, dec!(4.00));
}

#[tokio::test]
async fn depth_cutoff_finishes_with_stored_costs() {
    let app = TestApp::new().await;
    let parent = app.seed_product("DC-P", "Parent").await;
    let child = app.seed_product("DC-C", "Child").await;
    let grandchild = app.seed_product("DC-G", "Grandchild").await;
    let leaf = app.seed_product("DC-LEAF", "Leaf").await;

    app.seed_active_bom(grandchild, "Grandchild", vec![component(leaf, dec!(1), dec!(0.25))])
        .await;
    app.seed_active_bom(child, "Child", vec![component(grandchild, dec!(1), dec!(1.00))])
        .await;
    app.seed_active_bom(parent, "Parent", vec![component(child, dec!(2), dec!(3.00))])
        .await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(parent, Some(1))
        .await
        .expect("resolve with depth limit");
    let breakdown = costing::compute_cost(&tree);

    assert!(breakdown
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::DepthExceeded));

    // Child expanded but its grandchild line did not, so the child rolls up
    // from the stored 1.00 and the parent pays 2 x 1.00.
    let child_line = component_cost(&breakdown, child);
    assert!(child_line.cost_inherited);
    assert_eq!(child_line.effective_unit_cost, dec!(1.00));
    assert_eq!(breakdown.total_cost, dec!(2.00));
}

#[tokio::test]
async fn recompute_policy_stores_inherited_totals_with_submitted_baseline() {
    let app = TestApp::with_config(|cfg| cfg.rollup_policy = "recompute".to_string()).await;
    let flour = app.seed_product("FLOUR-RC", "Wheat flour").await;
    let wheat = app.seed_product("WHEAT-RC", "Raw wheat").await;
    let cake = app.seed_product("CAKE-RC", "Cake").await;
    let sugar = app.seed_product("SUGAR-RC", "Sugar").await;
    let eggs = app.seed_product("EGGS-RC", "Eggs").await;

    let mut flour_input = bom_input(flour, "Wheat flour", vec![component(wheat, dec!(1), dec!(2.00))]);
    flour_input.status = Some(bomworks_api::entities::bom_header::BomStatus::Active);
    flour_input.labor_cost = Some(dec!(0.50));
    flour_input.overhead_cost = Some(dec!(0.30));
    app.state
        .services
        .boms
        .create_bom(flour_input)
        .await
        .expect("seed flour bom");

    let mut cake_input = bom_input(
        cake,
        "Cake",
        vec![
            component(flour, dec!(1), dec!(2.50)),
            component(sugar, dec!(1), dec!(1.20)),
            component(eggs, dec!(1), dec!(3.00)),
        ],
    );
    cake_input.labor_cost = Some(dec!(2.50));
    let detail = app
        .state
        .services
        .boms
        .create_bom(cake_input)
        .await
        .expect("create cake bom");

    // The persisted line keeps the submitted 2.50 as its baseline but its
    // total was priced from the flour rollup.
    let flour_row = detail
        .components
        .iter()
        .find(|c| c.component_product_id == flour)
        .expect("flour row");
    assert_eq!(flour_row.unit_cost, dec!(2.50));
    assert_eq!(flour_row.total_cost, dec!(2.80));
    assert_eq!(detail.total_cost, dec!(9.50));
}

#[tokio::test]
async fn rollup_is_deterministic_for_a_fixed_tree() {
    let app = TestApp::new().await;
    let (_, _, wedding) = seed_bakery(&app).await;

    let tree = app
        .state
        .services
        .resolver
        .resolve_product(wedding, None)
        .await
        .expect("resolve wedding cake");
    assert_eq!(costing::compute_cost(&tree), costing::compute_cost(&tree));
}

#[tokio::test]
async fn structure_endpoint_reports_rolled_up_totals() {
    let app = TestApp::new().await;
    let (_, _, wedding) = seed_bakery(&app).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}/structure", wedding),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal_field(&body["data"]["cost"], "total_cost"), dec!(14.00));
}
