use financial_query_engine::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const INCOME_STATEMENT: &str = "\
,2023-24 Actual $'000,2024-25 Budget $'000,2026-27 Estimate $'000
Own-source revenue,\"1,200\",1300,1450
Revenue from Government,5000,5200,5400
Employee benefits,2100,2200,2300
Grants and subsidies,400,420,450
Total expenses,6200,6500,6900
";

const BALANCE_SHEET: &str = "\
Item,2024-25 Budget $'000,2025-26 Forward estimate $'000
Cash and cash equivalents,100,120
Total financial assets,1000,
Other assets,0,50
Total assets,5000,5500
Total liabilities,2000,2100
Net assets,3000,3400
";

const CONSOLIDATED_CASH_FLOW: &str = "\
Description,2024-25 Budget $'000
Net cash from operating activities,900
";

const DFSV_CASH_FLOW: &str = "\
Description,2024-25 Budget $'000
Net cash from operating activities,300
Net cash used in investing activities,-50
";

fn budget_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    for (name, csv) in [
        ("Budgeted Comprehensive Income Statement", INCOME_STATEMENT),
        ("Departmental Balance Sheet", BALANCE_SHEET),
        ("Cash Flow Statement (Consolidated)", CONSOLIDATED_CASH_FLOW),
        ("DFSV Cash Flow Statement", DFSV_CASH_FLOW),
    ] {
        store.load_csv(name, csv.as_bytes()).unwrap();
    }
    store
}

fn write_artifacts(dir: &Path) -> std::io::Result<()> {
    fs::write(
        dir.join("data_file_mapping.csv"),
        "metric,file_name,statement_type\n\
         revenue,Budgeted Comprehensive Income Statement,income_statement\n\
         grants,Budgeted Comprehensive Income Statement,income_statement\n",
    )?;
    fs::write(
        dir.join("budget-chatbot-training-row.txt"),
        "how much did we spend on grants|grants|all|Grants and subsidies\n",
    )?;
    fs::write(
        dir.join("budget-chatbot-training-Column.txt"),
        "grants, subsidies, handouts\n",
    )?;
    Ok(())
}

fn text(value: &CellValue) -> &str {
    match value {
        CellValue::Text(s) => s,
        other => panic!("expected text, got {:?}", other),
    }
}

#[test]
fn test_single_period_revenue_question() -> anyhow::Result<()> {
    let engine = QueryEngine::default();
    let store = budget_store();

    let intent = engine.resolve("What is the revenue for 2024-25?");
    assert_eq!(intent.entity, "revenue");
    assert_eq!(intent.action, Action::Get);
    assert_eq!(intent.years, BTreeSet::from(["2024-25".to_string()]));
    assert!(intent.confidence >= 0.9);

    match engine.answer("What is the revenue for 2024-25?", &store)? {
        Answer::Data {
            query, sql, result, ..
        } => {
            assert_eq!(query.table, "Budgeted_Comprehensive_Income_Statement");
            assert_eq!(
                query.projection,
                vec![
                    Projection::column("Unnamed_0"),
                    Projection::column("2024_25_Budget_Dollar000"),
                ]
            );
            assert!(sql.ends_with("LIMIT 10"));
            assert!(sql.contains("\"2024_25_Budget_Dollar000\""));

            assert_eq!(result.len(), 2);
            assert_eq!(text(&result.rows[0][0]), "Own-source revenue");
            assert_eq!(result.rows[0][1], CellValue::Number(1300.0));
            assert_eq!(result.rows[1][1], CellValue::Number(5200.0));
        }
        other => panic!("expected data answer, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_comparison_question() -> anyhow::Result<()> {
    let engine = QueryEngine::default();
    let store = budget_store();

    let question = "Compare assets between 2024-25 and 2025-26";
    let intent = engine.resolve(question);
    assert_eq!(intent.action, Action::Compare);
    assert_eq!(intent.entity, "assets");
    assert_eq!(intent.years.len(), 2);

    let answer = engine.answer(question, &store)?;
    let Answer::Data { query, result, .. } = answer else {
        panic!("expected data answer");
    };

    assert_eq!(query.table, "Departmental_Balance_Sheet");
    assert!(query.is_comparison());
    assert_eq!(query.limit, None);
    assert_eq!(
        result.columns,
        vec!["Item", "Year_1", "Year_2", "Difference", "Percentage_Change"]
    );

    // "Total financial assets" has no 2025-26 value and is dropped by the null guard.
    let items: Vec<&str> = result.rows.iter().map(|row| text(&row[0])).collect();
    assert_eq!(items, vec!["Other assets", "Total assets", "Net assets"]);

    let diffs = result.column_values("Difference").unwrap();
    let pct = result.column_values("Percentage_Change").unwrap();
    assert_eq!(*diffs[1], CellValue::Number(500.0));
    assert_eq!(*pct[0], CellValue::Null);
    assert_eq!(*pct[1], CellValue::Number(10.0));
    assert_eq!(*pct[2], CellValue::Number(13.33));

    Ok(())
}

#[test]
fn test_comparison_is_not_capped() {
    let mut csv = String::from("Item,2024-25 Budget,2025-26 Estimate\n");
    for i in 0..15 {
        csv.push_str(&format!("Revenue line {},{},{}\n", i, 100 + i, 110 + i));
    }
    let mut store = MemoryStore::new();
    store.load_csv("Income Statement", csv.as_bytes()).unwrap();

    let engine = QueryEngine::default();
    let compare = engine
        .answer("Compare revenue between 2024-25 and 2025-26", &store)
        .unwrap();
    let single = engine.answer("What is the revenue for 2024-25?", &store).unwrap();

    match (compare, single) {
        (Answer::Data { result: c, .. }, Answer::Data { result: s, .. }) => {
            assert_eq!(c.len(), 15);
            assert_eq!(s.len(), 10);
        }
        other => panic!("expected two data answers, got {:?}", other),
    }
}

#[test]
fn test_cash_flow_prefers_marker_table() -> anyhow::Result<()> {
    let engine = QueryEngine::default();
    let answer = engine.answer(
        "What is the net cash from operating activities for 2024-25?",
        &budget_store(),
    )?;

    assert_eq!(answer.intent().entity, "cash_flow");
    let Answer::Data {
        query,
        result,
        row_hint,
        ..
    } = answer
    else {
        panic!("expected data answer");
    };
    assert_eq!(query.table, "DFSV_Cash_Flow_Statement");
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[1][1], CellValue::Number(-50.0));
    assert_eq!(row_hint, "Net cash from operating activities");
    Ok(())
}

#[test]
fn test_empty_catalog_reports_no_data() {
    let engine = QueryEngine::default();
    let intent = engine.resolve("What is the revenue for 2024-25?");

    assert!(matches!(
        engine.synthesize(&intent, &SchemaCatalog::default()),
        Err(FinancialQueryError::NoDataAvailable)
    ));

    let err = engine
        .answer("What is the revenue for 2024-25?", &MemoryStore::new())
        .unwrap_err();
    let guidance = err.guidance(&engine.config().supported_years);
    assert!(guidance.message.contains("No financial statements"));
    assert!(guidance.suggestions.len() <= 3);
}

#[test]
fn test_conversation_is_deterministic_and_short_circuits() {
    let engine = QueryEngine::default();
    let store = MemoryStore::new();

    let cases = [
        ("Good morning!", ConversationKind::Greeting),
        ("hi, what's the revenue for 2024-25?", ConversationKind::Greeting),
        ("Thank you", ConversationKind::Goodbye),
        ("What can you do?", ConversationKind::Help),
        ("Are you working?", ConversationKind::Status),
    ];

    for (question, expected) in cases {
        for _ in 0..3 {
            let intent = engine.resolve(question);
            assert_eq!(intent.action, Action::Conversation);
            assert_eq!(intent.entity, expected.as_str());
            assert_eq!(intent.confidence, 1.0);
            assert!(intent.years.is_empty());
        }

        // An empty store is never touched for small talk.
        match engine.answer(question, &store).unwrap() {
            Answer::Conversation { kind, reply, .. } => {
                assert_eq!(kind, expected);
                let any_time = [
                    TimeOfDay::Morning,
                    TimeOfDay::Afternoon,
                    TimeOfDay::Evening,
                    TimeOfDay::Night,
                ]
                .into_iter()
                .any(|tod| conversation::response_templates(kind, Some(tod)).contains(&reply));
                assert!(any_time);
            }
            other => panic!("expected conversation, got {:?}", other),
        }
    }
}

#[test]
fn test_confidence_floor_and_determinism() {
    let engine = QueryEngine::default();
    let questions = [
        "hmm",
        "revenue",
        "What are the total assets for 2024-25?",
        "Compare revenue between 2024-25 and 2025-26",
        "show me the budget",
    ];

    for question in questions {
        let intent = engine.resolve(question);
        assert!(intent.confidence >= 0.90 && intent.confidence <= 1.0);
        assert_eq!(
            engine.score(&intent.entity, &intent.years, question),
            intent.confidence
        );
    }
}

#[test]
fn test_year_normalization_through_resolve() {
    let engine = QueryEngine::default();
    let years = |q: &str| engine.resolve(q).years;

    assert_eq!(years("revenue in 2024"), BTreeSet::from(["2024-25".to_string()]));
    assert_eq!(years("revenue in 2024/25"), BTreeSet::from(["2024-25".to_string()]));
    assert!(years("revenue in 2030-31").is_empty());
}

#[test]
fn test_follow_up_shortcuts() -> anyhow::Result<()> {
    let engine = QueryEngine::default();
    let store = budget_store();

    for question in ["give me the value", "2024-2025?"] {
        match engine.answer(question, &store)? {
            Answer::Data { intent, result, .. } => {
                assert_eq!(intent.entity, "cash_and_cash_equivalents");
                assert!(intent.years.contains("2024-25"));
                assert_eq!(result.len(), 1);
                assert_eq!(text(&result.rows[0][0]), "Cash and cash equivalents");
            }
            other => panic!("expected data answer, got {:?}", other),
        }
    }
    Ok(())
}

#[test]
fn test_empty_result_and_invalid_input() {
    let engine = QueryEngine::default();
    let store = budget_store();

    // No Agency column on the balance sheet, so the filter is dropped.
    assert!(engine
        .answer("What are the liabilities for 2024-25? dfsv", &store)
        .is_ok());

    let err = engine
        .answer("What is the net income for 2024-25?", &store)
        .unwrap_err();
    assert!(matches!(err, FinancialQueryError::EmptyResult { .. }));
    assert!(err
        .guidance(&engine.config().supported_years)
        .message
        .contains("couldn't find any data"));

    assert!(matches!(
        engine.answer("revenue'; DROP TABLE budget; --", &store),
        Err(FinancialQueryError::InvalidInput(_))
    ));
}

#[test]
fn test_knowledge_artifacts_from_directory() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_artifacts(dir.path())?;

    let mut config = EngineConfig::default();
    config.knowledge = KnowledgeSources::in_dir(dir.path());
    let engine = QueryEngine::from_config(config);

    let knowledge = engine.knowledge();
    assert!(knowledge.is_known_entity("grants"));
    assert_eq!(knowledge.file_mappings().len(), 2);
    assert!(knowledge.synonyms("grants").unwrap().contains("handouts"));

    match engine.answer("How much in grants for 2024-25?", &budget_store())? {
        Answer::Data {
            intent,
            result,
            row_hint,
            ..
        } => {
            assert_eq!(intent.entity, "grants");
            assert_eq!(row_hint, "Grants and subsidies");
            assert_eq!(result.len(), 1);
            assert_eq!(result.rows[0][1], CellValue::Number(420.0));
        }
        other => panic!("expected data answer, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_missing_artifacts_fall_back_to_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = QueryEngine::from_config(EngineConfig {
        knowledge: KnowledgeSources::in_dir(dir.path()),
        ..EngineConfig::default()
    });

    assert_eq!(engine.knowledge().file_mappings().len(), 11);
    assert!(!engine.knowledge().is_known_entity("grants"));

    // Artifacts appear later; a reload picks them up.
    write_artifacts(dir.path())?;
    let reloaded = engine.reload_knowledge();
    assert!(reloaded.is_known_entity("grants"));
    assert_eq!(engine.resolve("How much in grants for 2024-25?").entity, "grants");
    Ok(())
}

#[test]
fn test_concurrent_resolution_during_reload() {
    let engine = QueryEngine::default();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let intent = engine.resolve("What is the revenue for 2024-25?");
                    assert_eq!(intent.entity, "revenue");
                    assert!(intent.confidence >= 0.9);
                }
            });
        }

        for _ in 0..10 {
            engine.replace_knowledge(KnowledgeBase::builtin());
        }
    });
}

#[test]
fn test_suggestions_for_vague_question() {
    let engine = QueryEngine::default();
    let suggestions = engine.suggest_alternatives("tell me something");
    assert_eq!(suggestions.len(), 3);
    assert!(suggestions[1].starts_with("Available years: 2023-24"));
}

#[test]
fn test_schema_generation() {
    let intent_schema = serde_json::to_value(QueryIntent::generate_json_schema()).unwrap();
    assert!(intent_schema["properties"]["years"].is_object());

    let spec_schema = serde_json::to_string(&schemars::schema_for!(QuerySpec)).unwrap();
    assert!(spec_schema.contains("percent_change"));
}
