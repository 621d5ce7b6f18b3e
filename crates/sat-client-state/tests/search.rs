use sat_client_state::search::{SearchChannel, SearchUser};
use sat_client_state::{
    item_at_cursor, parse_query, recommend, SearchCommand, SearchError, SearchFilter,
    SearchOrderType, SearchParam, SearchRecommend, SearchResult, SearchResultGroupType,
};

#[test]
fn query_items_carry_char_cursors() {
    let items = parse_query("from:alice  naïve has:");
    assert_eq!(items.len(), 3);

    assert_eq!(items[0].command, SearchCommand::From);
    assert_eq!(items[0].value, "alice");
    assert_eq!((items[0].cursor_start, items[0].cursor_end), (0, 10));

    assert_eq!(items[1].command, SearchCommand::Empty);
    assert_eq!(items[1].value, "naïve");
    assert_eq!(items[1].index, 1);
    assert_eq!((items[1].cursor_start, items[1].cursor_end), (12, 17));

    assert_eq!(items[2].command, SearchCommand::Has);
    assert_eq!(items[2].value, "");
    assert_eq!((items[2].cursor_start, items[2].cursor_end), (18, 22));
}

#[test]
fn unknown_commands_are_free_text() {
    let items = parse_query("http://example.org to:bob");
    assert!(items.iter().all(|i| i.command == SearchCommand::Empty));
    assert_eq!(items[0].value, "http://example.org");
    assert_eq!(items[1].value, "to:bob");
}

#[test]
fn blank_query_has_no_items() {
    assert!(parse_query("").is_empty());
    assert!(parse_query("   \t ").is_empty());
}

#[test]
fn cursor_lookup() {
    let items = parse_query("budget in:gen");
    assert_eq!(item_at_cursor(&items, 13).map(|i| i.command), Some(SearchCommand::In));
    assert_eq!(item_at_cursor(&items, 3).map(|i| i.index), Some(0));
    assert!(item_at_cursor(&items, 40).is_none());
}

#[test]
fn param_from_mixed_query() {
    let param = SearchParam::parse("q3 from:alice has:Image after:2024-03-01 report in:general").unwrap();
    assert_eq!(param.query, "q3 report");
    assert_eq!(param.groupby, SearchResultGroupType::Messages);
    assert_eq!(param.orderby, SearchOrderType::New);
    assert_eq!(
        param.filters,
        vec![
            SearchFilter::new("from", "alice"),
            SearchFilter::new("has", "image"),
            SearchFilter::new("date", "after:2024-03-01"),
            SearchFilter::new("in", "general"),
        ]
    );
}

#[test]
fn param_json_shape() {
    let items = parse_query("hello before:2023-12-31 mentions:");
    let param = SearchParam::from_items(&items, SearchResultGroupType::Files, SearchOrderType::Relevant)
        .unwrap();
    assert_eq!(
        param.to_json().unwrap(),
        r#"{"query":"hello","groupby":"files","filters":[{"key":"date","value":"before:2023-12-31"}],"orderby":"relevant"}"#
    );
}

#[test]
fn invalid_values_are_reported() {
    assert_eq!(
        SearchParam::parse("during:yesterday").unwrap_err(),
        SearchError::InvalidDate {
            command: SearchCommand::During,
            value: "yesterday".into()
        }
    );
    assert_eq!(
        SearchParam::parse("has:gif").unwrap_err(),
        SearchError::InvalidHas("gif".into())
    );
}

#[test]
fn recommendations_follow_command_kind() {
    let mut known = SearchRecommend::new();
    known.insert(
        "user".into(),
        vec![
            SearchUser {
                name: "Alice".into(),
                value: "alice".into(),
                address: "0xa11ce".into(),
                avatar: None,
            }
            .into(),
            SearchUser {
                name: "Bob".into(),
                value: "bob".into(),
                address: "0xb0b".into(),
                avatar: None,
            }
            .into(),
        ],
    );
    known.insert(
        "channel".into(),
        vec![SearchChannel {
            name: "General".into(),
            value: "general".into(),
            address: "0x9e9".into(),
        }
        .into()],
    );

    let items = parse_query("from:Al has:i in: before:");
    let from: Vec<_> = recommend(&items[0], &known).into_iter().map(|o| o.value).collect();
    assert_eq!(from, vec!["alice"]);

    let has: Vec<_> = recommend(&items[1], &known).into_iter().map(|o| o.value).collect();
    assert_eq!(has, vec!["image"]);

    assert_eq!(recommend(&items[2], &known).len(), 1);
    assert!(recommend(&items[3], &known).is_empty());
}

#[test]
fn result_payload_parses() {
    let raw = r#"{
        "query": "hello",
        "recommend": {"user": [{"key": "user", "value": "alice", "name": "Alice"}]},
        "data": {
            "pageInfo": {"totalRows": 2, "perPage": 10, "pageIndex": 0},
            "list": [
                {"id": "m1", "at": 1700000000000, "type": "text", "user": {"id": "u1", "name": "Alice"}},
                {"id": "f1", "at": 1700000100000, "type": "file"}
            ]
        }
    }"#;
    let result: SearchResult = serde_json::from_str(raw).unwrap();
    assert_eq!(result.data.page_info.page_count(), 1);
    assert_eq!(result.data.list.len(), 2);
    assert_eq!(result.recommend["user"][0].name.as_deref(), Some("Alice"));
}
