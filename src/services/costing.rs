use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

use crate::services::structure::{ResolvedBomNode, ResolvedComponent};

/// Scale for monetary values at the point they are persisted or displayed.
pub const MONEY_SCALE: u32 = 2;

/// Scale for quantity columns.
pub const QUANTITY_SCALE: u32 = 4;

/// Rounds a monetary amount to currency precision. Rollup math stays at full
/// precision and only calls this when a value leaves the calculator, so
/// rounding error does not compound across BOM levels.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity_required * (1 + waste_percentage / 100)`.
pub fn quantity_with_waste(quantity_required: Decimal, waste_percentage: Decimal) -> Decimal {
    quantity_required * (Decimal::ONE + waste_percentage / Decimal::ONE_HUNDRED)
}

/// Cost figures for one resolved BOM node.
///
/// `warnings` covers this node's own components and everything below it;
/// nested breakdowns keep their local warnings too, so the root of a
/// computation always reports every degraded spot in one list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub bom_id: Uuid,
    pub bom_number: String,
    /// Sum of component line costs at effective unit prices.
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub total_quantity: Decimal,
    /// `total_cost / total_quantity`, what one unit of this BOM's output
    /// costs to make. Zero when `total_quantity` is zero.
    pub effective_unit_cost: Decimal,
    pub components: Vec<ComponentCost>,
    pub warnings: Vec<CostWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentCost {
    pub component_product_id: Uuid,
    pub product_name: String,
    pub line_number: i32,
    pub quantity_with_waste: Decimal,
    pub effective_unit_cost: Decimal,
    pub total_cost: Decimal,
    /// True when the unit price came from rolling up the component's own
    /// sub-BOM instead of the stored `unit_cost`.
    pub cost_inherited: bool,
    pub sub_bom: Option<Box<CostBreakdown>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    CycleDetected,
    DepthExceeded,
    ZeroQuantity,
}

/// Non-fatal condition met during a rollup. The computation completes and
/// prices the affected component from its stored `unit_cost` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostWarning {
    pub kind: WarningKind,
    pub bom_id: Uuid,
    pub component_product_id: Uuid,
    pub message: String,
}

/// Computes the rolled-up cost of a resolved tree, bottom-up.
///
/// Pure function, no I/O. Leaf components are priced at their stored
/// `unit_cost`; a component with an expanded sub-BOM is priced at that
/// sub-BOM's freshly computed cost per output unit. Components the resolver
/// flagged as cycles or depth cut-offs fall back to the stored price and
/// surface a warning rather than aborting the whole computation.
pub fn compute_cost(node: &ResolvedBomNode) -> CostBreakdown {
    let mut components = Vec::with_capacity(node.components.len());
    let mut warnings = Vec::new();
    let mut material_cost = Decimal::ZERO;

    for line in &node.components {
        let mut cost_inherited = false;
        let mut sub_breakdown = None;

        let effective_unit_cost = match &line.sub_bom {
            Some(sub) => {
                let breakdown = compute_cost(sub);
                let unit = if breakdown.total_quantity.is_zero() {
                    warnings.push(CostWarning {
                        kind: WarningKind::ZeroQuantity,
                        bom_id: sub.bom_id,
                        component_product_id: line.component_product_id,
                        message: format!(
                            "Sub-BOM {} produces zero quantity; {} priced at its stored unit cost",
                            sub.bom_number, line.product_name
                        ),
                    });
                    line.unit_cost
                } else {
                    cost_inherited = true;
                    breakdown.effective_unit_cost
                };
                warnings.extend(breakdown.warnings.iter().cloned());
                sub_breakdown = Some(Box::new(breakdown));
                unit
            }
            None => {
                if line.cycle_detected {
                    warnings.push(CostWarning {
                        kind: WarningKind::CycleDetected,
                        bom_id: node.bom_id,
                        component_product_id: line.component_product_id,
                        message: format!(
                            "{} re-enters the structure above it; priced at its stored unit cost",
                            line.product_name
                        ),
                    });
                } else if line.depth_exceeded {
                    warnings.push(CostWarning {
                        kind: WarningKind::DepthExceeded,
                        bom_id: node.bom_id,
                        component_product_id: line.component_product_id,
                        message: format!(
                            "{} sits below the depth limit cut-off; priced at its stored unit cost",
                            line.product_name
                        ),
                    });
                }
                line.unit_cost
            }
        };

        let quantity = effective_quantity(line);
        let line_cost = quantity * effective_unit_cost;
        material_cost += line_cost;

        components.push(ComponentCost {
            component_product_id: line.component_product_id,
            product_name: line.product_name.clone(),
            line_number: line.line_number,
            quantity_with_waste: quantity,
            effective_unit_cost,
            total_cost: line_cost,
            cost_inherited,
            sub_bom: sub_breakdown,
        });
    }

    let total_cost = material_cost + node.labor_cost + node.overhead_cost;
    let effective_unit_cost = if node.total_quantity.is_zero() {
        warnings.push(CostWarning {
            kind: WarningKind::ZeroQuantity,
            bom_id: node.bom_id,
            component_product_id: node.product_id,
            message: format!(
                "BOM {} has zero total quantity; unit cost reported as zero",
                node.bom_number
            ),
        });
        Decimal::ZERO
    } else {
        total_cost / node.total_quantity
    };

    CostBreakdown {
        bom_id: node.bom_id,
        bom_number: node.bom_number.clone(),
        material_cost,
        labor_cost: node.labor_cost,
        overhead_cost: node.overhead_cost,
        total_cost,
        total_quantity: node.total_quantity,
        effective_unit_cost,
        components,
        warnings,
    }
}

/// Stored `quantity_with_waste`, recomputed from the raw quantity when the
/// stored value is zero. Older rows written before the column was derived at
/// save time can carry a zero here.
fn effective_quantity(line: &ResolvedComponent) -> Decimal {
    if line.quantity_with_waste.is_zero() {
        quantity_with_waste(line.quantity_required, line.waste_percentage)
    } else {
        line.quantity_with_waste
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::bom_header::BomStatus;
    use rust_decimal_macros::dec;

    fn leaf(name: &str, quantity: Decimal, unit_cost: Decimal) -> ResolvedComponent {
        ResolvedComponent {
            component_id: Uuid::new_v4(),
            component_product_id: Uuid::new_v4(),
            product_name: name.to_string(),
            line_number: 1,
            quantity_required: quantity,
            unit_of_measure: "each".to_string(),
            waste_percentage: Decimal::ZERO,
            unit_cost,
            quantity_with_waste: quantity,
            total_cost: quantity * unit_cost,
            supplier_id: None,
            notes: None,
            has_sub_bom: false,
            cycle_detected: false,
            depth_exceeded: false,
            sub_bom: None,
        }
    }

    fn assembly(name: &str, quantity: Decimal, sub: ResolvedBomNode) -> ResolvedComponent {
        ResolvedComponent {
            has_sub_bom: true,
            sub_bom: Some(Box::new(sub)),
            ..leaf(name, quantity, Decimal::ZERO)
        }
    }

    fn node(
        bom_number: &str,
        product_name: &str,
        labor: Decimal,
        overhead: Decimal,
        total_quantity: Decimal,
        components: Vec<ResolvedComponent>,
    ) -> ResolvedBomNode {
        ResolvedBomNode {
            bom_id: Uuid::new_v4(),
            bom_number: bom_number.to_string(),
            product_id: Uuid::new_v4(),
            product_name: product_name.to_string(),
            name: format!("{} recipe", product_name),
            version: 1,
            status: BomStatus::Active,
            labor_cost: labor,
            overhead_cost: overhead,
            total_cost: Decimal::ZERO,
            total_quantity,
            unit_of_measure: "kg".to_string(),
            depth: 0,
            components,
        }
    }

    fn wheat_bom() -> ResolvedBomNode {
        // Raw wheat 2.00 + processing labor 0.50 + packaging overhead 0.30
        node(
            "BOM-WHEAT",
            "Wheat Flour",
            dec!(0.50),
            dec!(0.30),
            dec!(1),
            vec![leaf("Raw Wheat", dec!(1), dec!(2.00))],
        )
    }

    fn cake_bom() -> ResolvedBomNode {
        node(
            "BOM-CAKE",
            "Cake",
            dec!(2.50),
            Decimal::ZERO,
            dec!(1),
            vec![
                assembly("Wheat Flour", dec!(1), wheat_bom()),
                leaf("Sugar", dec!(1), dec!(1.20)),
                leaf("Eggs", dec!(1), dec!(3.00)),
            ],
        )
    }

    fn wedding_cake_bom() -> ResolvedBomNode {
        node(
            "BOM-WEDDING",
            "Wedding Cake",
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1),
            vec![
                assembly("Cake", dec!(1), cake_bom()),
                leaf("Icing", dec!(1), dec!(2.00)),
                leaf("Decorations", dec!(1), dec!(1.50)),
                leaf("Special Packaging", dec!(1), dec!(1.00)),
            ],
        )
    }

    #[test]
    fn single_level_rollup_adds_labor_and_overhead() {
        let breakdown = compute_cost(&wheat_bom());

        assert_eq!(breakdown.material_cost, dec!(2.00));
        assert_eq!(breakdown.total_cost, dec!(2.80));
        assert_eq!(breakdown.effective_unit_cost, dec!(2.80));
        assert!(breakdown.warnings.is_empty());
    }

    #[test]
    fn two_level_rollup_prices_flour_from_wheat_bom() {
        let breakdown = compute_cost(&cake_bom());

        let flour = &breakdown.components[0];
        assert!(flour.cost_inherited);
        assert_eq!(flour.effective_unit_cost, dec!(2.80));

        // 2.80 flour + 1.20 sugar + 3.00 eggs, then 2.50 labor on top
        assert_eq!(breakdown.material_cost, dec!(7.00));
        assert_eq!(breakdown.total_cost, dec!(9.50));
    }

    #[test]
    fn three_level_rollup_prices_cake_from_its_own_rollup() {
        let breakdown = compute_cost(&wedding_cake_bom());

        let cake = &breakdown.components[0];
        assert!(cake.cost_inherited);
        assert_eq!(cake.effective_unit_cost, dec!(9.50));

        // 9.50 cake + 2.00 icing + 1.50 decorations + 1.00 packaging
        assert_eq!(breakdown.total_cost, dec!(14.00));
        assert!(breakdown.warnings.is_empty());
    }

    #[test]
    fn waste_percentage_inflates_required_quantity() {
        assert_eq!(quantity_with_waste(dec!(0.5), dec!(10)), dec!(0.55));
        assert_eq!(quantity_with_waste(dec!(3), Decimal::ZERO), dec!(3));
        assert_eq!(quantity_with_waste(dec!(2), dec!(12.5)), dec!(2.25));
    }

    #[test]
    fn zero_stored_waste_quantity_is_recomputed() {
        let mut line = leaf("Bolt", dec!(4), dec!(0.25));
        line.waste_percentage = dec!(25);
        line.quantity_with_waste = Decimal::ZERO;

        let bom = node("BOM-X", "Bracket", Decimal::ZERO, Decimal::ZERO, dec!(1), vec![line]);
        let breakdown = compute_cost(&bom);

        assert_eq!(breakdown.components[0].quantity_with_waste, dec!(5));
        assert_eq!(breakdown.total_cost, dec!(1.25));
    }

    #[test]
    fn cycle_marker_falls_back_to_stored_cost_with_warning() {
        let mut line = leaf("Frame", dec!(2), dec!(7.00));
        line.has_sub_bom = true;
        line.cycle_detected = true;

        let bom = node("BOM-Y", "Chassis", Decimal::ZERO, Decimal::ZERO, dec!(1), vec![line]);
        let breakdown = compute_cost(&bom);

        assert_eq!(breakdown.total_cost, dec!(14.00));
        assert!(!breakdown.components[0].cost_inherited);
        assert_eq!(breakdown.warnings.len(), 1);
        assert_eq!(breakdown.warnings[0].kind, WarningKind::CycleDetected);
    }

    #[test]
    fn depth_marker_falls_back_to_stored_cost_with_warning() {
        let mut line = leaf("Gearbox", dec!(1), dec!(120.00));
        line.has_sub_bom = true;
        line.depth_exceeded = true;

        let bom = node("BOM-Z", "Drive", Decimal::ZERO, Decimal::ZERO, dec!(1), vec![line]);
        let breakdown = compute_cost(&bom);

        assert_eq!(breakdown.total_cost, dec!(120.00));
        assert_eq!(breakdown.warnings[0].kind, WarningKind::DepthExceeded);
    }

    #[test]
    fn nested_warnings_bubble_to_the_root() {
        let mut inner_line = leaf("Axle", dec!(1), dec!(5.00));
        inner_line.has_sub_bom = true;
        inner_line.cycle_detected = true;
        let inner = node("BOM-INNER", "Axle Assembly", Decimal::ZERO, Decimal::ZERO, dec!(1), vec![inner_line]);

        let outer = node(
            "BOM-OUTER",
            "Cart",
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1),
            vec![assembly("Axle Assembly", dec!(2), inner)],
        );

        let breakdown = compute_cost(&outer);
        assert_eq!(breakdown.warnings.len(), 1);
        assert_eq!(breakdown.warnings[0].kind, WarningKind::CycleDetected);
        // The nested breakdown keeps its own copy as well.
        let nested = breakdown.components[0].sub_bom.as_ref().unwrap();
        assert_eq!(nested.warnings.len(), 1);
    }

    #[test]
    fn zero_output_quantity_reports_zero_unit_cost() {
        let bom = node(
            "BOM-EMPTY",
            "Ghost",
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            vec![leaf("Part", dec!(1), dec!(3.00))],
        );

        let breakdown = compute_cost(&bom);
        assert_eq!(breakdown.effective_unit_cost, Decimal::ZERO);
        assert_eq!(breakdown.warnings[0].kind, WarningKind::ZeroQuantity);
    }

    #[test]
    fn intermediate_math_stays_full_precision_until_rounded() {
        // A batch of 3 costing 10.00 gives a repeating unit cost. Three units
        // of it must come back to 10.00 after money rounding, which only
        // holds when the division result is not rounded in between.
        let batch = node(
            "BOM-BATCH",
            "Widget",
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(3),
            vec![leaf("Metal", dec!(1), dec!(10.00))],
        );

        let parent = node(
            "BOM-PARENT",
            "Crate of Widgets",
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(1),
            vec![assembly("Widget", dec!(3), batch)],
        );

        let breakdown = compute_cost(&parent);
        assert_eq!(round_money(breakdown.total_cost), dec!(10.00));
    }

    #[test]
    fn round_money_uses_midpoint_away_from_zero() {
        assert_eq!(round_money(dec!(2.005)), dec!(2.01));
        assert_eq!(round_money(dec!(-2.005)), dec!(-2.01));
        assert_eq!(round_money(dec!(2.004)), dec!(2.00));
    }
}
