//! Every routed task type has a template, a schema and a matching family

use ai_gateway::llm::TemplateRegistry;
use ai_gateway::routing::ROUTES;
use ai_gateway::validation::SchemaRegistry;

#[test]
fn test_every_route_has_template_and_schema() {
    let templates = TemplateRegistry::with_defaults();
    let schemas = SchemaRegistry::with_defaults();

    for route in ROUTES {
        assert!(templates.contains(route.task_type), "no template for {}", route.task_type);
        let schema = schemas
            .get(route.task_type)
            .unwrap_or_else(|| panic!("no schema for {}", route.task_type));
        assert_eq!(schema.family(), route.family, "{}", route.task_type);
    }
}

#[test]
fn test_no_schema_without_a_route() {
    let schemas = SchemaRegistry::with_defaults();
    for task_type in schemas.task_types() {
        assert!(
            ROUTES.iter().any(|r| r.task_type == task_type),
            "{} has a schema but no route",
            task_type
        );
    }
}
