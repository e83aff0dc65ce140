//! End-to-end flows: view state driving the real client against a mock backend.

use std::time::{Duration, Instant};

use libreria_api::ApiClient;
use libreria_application::AppContext;
use libreria_application::edit::EditField;
use libreria_application::library::{self, LibraryAction, LibraryState};
use libreria_application::rag::RagSession;
use libreria_application::reader::ReaderState;
use libreria_application::upload::UploadQueue;
use libreria_core::{ApiFailure, BookId, LibraryFilters, Route, Sender, Theme, UploadStatus};
use libreria_engine::EpubBook;
use libreria_storage::Storage;
use libreria_test::{book_json, build_epub, make_book, make_settings};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Runs `f` with a fresh blocking client off the async runtime, mapping
/// errors the way the UI does.
async fn call<T, F>(base: String, f: F) -> anyhow::Result<Result<T, ApiFailure>>
where
    F: FnOnce(&ApiClient) -> libreria_api::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let out = tokio::task::spawn_blocking(move || {
        let client = ApiClient::new(&base)?;
        Ok::<_, libreria_api::ApiError>(f(&client))
    })
    .await??;
    Ok(out.map_err(ApiFailure::from))
}

#[tokio::test]
async fn search_without_matches_shows_empty_message() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books/"))
        .and(query_param("search", "Tolkien"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let start = Instant::now();
    let mut state = LibraryState::new(LibraryFilters::default());
    let first = state.mount();
    state.apply_list(first.ticket, Ok(vec![make_book(1, "Lagar", "/l.epub")]));

    for (i, c) in "Tolkien".chars().enumerate() {
        let at = start + Duration::from_millis(40 * i as u64);
        state.push_search_char(c, at);
        assert!(state.tick(at).is_none());
    }
    let request = state
        .tick(start + Duration::from_secs(1))
        .expect("debounced search");
    assert_eq!(state.status_message(), Some(library::MSG_LOADING));

    let query = request.query.clone();
    let result = call(server.uri(), move |c| c.list_books(&query)).await?;
    assert!(state.apply_list(request.ticket, result));
    assert_eq!(state.status_message(), Some(library::MSG_EMPTY));
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_shows_connection_message() -> anyhow::Result<()> {
    let mut state = LibraryState::new(LibraryFilters::default());
    let request = state.mount();
    let query = request.query.clone();
    let result = call("http://127.0.0.1:9".to_string(), move |c| c.list_books(&query)).await?;
    assert_eq!(result, Err(ApiFailure::Connection));
    state.apply_list(request.ticket, result);
    assert_eq!(state.status_message(), Some(library::MSG_LIST_CONNECTION));
    Ok(())
}

#[tokio::test]
async fn rag_session_uses_numeric_book_id_as_string() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rag/upload-book/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"book_id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rag/query/"))
        .and(body_json(json!({"query": "¿Quién narra?", "book_id": "7"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Un niño."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let file = dir.path().join("pedro.pdf");
    std::fs::write(&file, b"%PDF-1.4")?;

    let mut session = RagSession::new();
    assert!(!session.can_query());
    session.select_file(file);
    let upload_path = session.begin_upload().expect("file selected");
    let result = call(server.uri(), move |c| c.rag_upload(&upload_path)).await?;
    session.finish_upload(result);
    assert_eq!(session.book_id(), Some("7"));

    session.query = "¿Quién narra?".to_string();
    let request = session.begin_query().expect("ready to ask");
    assert_eq!(session.history.len(), 1);
    let result = call(server.uri(), move |c| c.rag_query(&request.query, &request.book_id)).await?;
    session.finish_query(result);

    let turns: Vec<(Sender, &str)> = session
        .history
        .iter()
        .map(|m| (m.sender, m.text.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![(Sender::User, "¿Quién narra?"), (Sender::Assistant, "Un niño.")]
    );
    Ok(())
}

#[tokio::test]
async fn uploads_run_one_at_a_time_in_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload-book/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "Subido"})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload-book/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Formato no soportado"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let paths: Vec<_> = ["a.epub", "b.pdf", "c.epub"]
        .iter()
        .map(|name| dir.path().join(name))
        .collect();
    for p in &paths {
        std::fs::write(p, b"data")?;
    }

    let mut queue = UploadQueue::new();
    assert_eq!(queue.add_files(paths.clone()), 3);
    let mut next = queue.start();
    let mut order = Vec::new();
    while let Some((index, file)) = next {
        let in_flight = queue
            .items
            .iter()
            .filter(|i| i.status == UploadStatus::Uploading)
            .count();
        assert_eq!(in_flight, 1);
        order.push(index);
        let result = call(server.uri(), move |c| {
            c.upload_book(&file).map(|uploaded| uploaded.title)
        })
        .await?;
        queue.complete(index, result);
        next = queue.advance();
    }

    assert_eq!(order, vec![0, 1, 2]);
    assert!(queue.all_done());
    assert!(!queue.is_running());
    assert_eq!(queue.items[0].status, UploadStatus::Success);
    assert_eq!(queue.items[0].message, "'Subido' añadido correctamente.");
    assert_eq!(queue.items[2].status, UploadStatus::Error);
    assert_eq!(queue.items[2].message, "Error: Formato no soportado");
    Ok(())
}

#[tokio::test]
async fn book_leaves_list_only_after_successful_delete() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/books/2"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/books/2"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut state = LibraryState::new(LibraryFilters::default());
    let request = state.mount();
    state.apply_list(
        request.ticket,
        Ok(vec![
            make_book(1, "Tala", "/tala.epub"),
            make_book(2, "Lagar", "/lagar.pdf"),
        ]),
    );
    state.selected = 1;

    for expected_len in [2, 1] {
        assert!(state.request_delete());
        let Some(LibraryAction::Delete(id)) = state.answer_confirm(true) else {
            panic!("expected delete action");
        };
        let result = call(server.uri(), move |c| c.delete_book(id)).await?;
        state.apply_delete(id, result);
        assert_eq!(state.books.len(), expected_len);
        state.dismiss_alert();
    }
    assert_eq!(state.books[0].id, BookId(1));
    Ok(())
}

#[tokio::test]
async fn unread_edit_sends_null_rating_and_replaces_book() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let mut saved = make_book(3, "Ternura", "/ternura.epub");
    saved.category = "Infantil".to_string();
    Mock::given(method("PUT"))
        .and(path("/books/3"))
        .and(body_json(json!({
            "title": "Ternura",
            "author": "Gabriela Mistral",
            "category": "Infantil",
            "description": "",
            "rating": null,
            "is_read": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(book_json(&saved)))
        .expect(1)
        .mount(&server)
        .await;

    let mut original = make_book(3, "Ternura", "/ternura.epub");
    original.is_read = true;
    original.rating = Some(8.0);

    let mut state = LibraryState::new(LibraryFilters::default());
    let request = state.mount();
    state.apply_list(request.ticket, Ok(vec![original]));
    assert!(state.open_edit());

    let form = state.edit.as_mut().expect("form open");
    form.focus = EditField::Category;
    form.category.clear();
    "Infantil".chars().for_each(|c| form.insert_char(c));
    form.toggle_read();
    let (id, update) = form.begin_submit().expect("valid form");

    let result = call(server.uri(), move |c| c.update_book(id, &update)).await?;
    state.apply_edit(result);
    assert!(state.edit.is_none());
    assert_eq!(state.books[0].category, "Infantil");
    assert!(!state.books[0].is_read);
    assert_eq!(state.books[0].rating, None);
    Ok(())
}

#[tokio::test]
async fn kindle_message_clears_after_six_seconds() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/books/1/send-to-kindle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = LibraryState::new(LibraryFilters::default());
    let request = state.mount();
    state.apply_list(request.ticket, Ok(vec![make_book(1, "Tala", "/tala.epub")]));
    assert!(state.request_kindle());
    let Some(LibraryAction::SendToKindle(id)) = state.answer_confirm(true) else {
        panic!("expected kindle action");
    };
    assert_eq!(state.kindle.message(id), Some(library::MSG_KINDLE_SENDING));

    let result = call(server.uri(), move |c| c.send_to_kindle(id)).await?;
    let done = Instant::now();
    state.apply_kindle(id, result, done);
    assert_eq!(state.kindle.message(id), Some(library::MSG_KINDLE_SENT));
    assert!(!state.expire_messages(done + Duration::from_secs(5)));
    assert!(state.kindle.message(id).is_some());
    assert!(state.expire_messages(done + Duration::from_secs(6)));
    assert_eq!(state.kindle.message(id), None);
    Ok(())
}

#[tokio::test]
async fn resending_to_kindle_restarts_the_message_timer() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/books/1/send-to-kindle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let mut state = LibraryState::new(LibraryFilters::default());
    let request = state.mount();
    state.apply_list(request.ticket, Ok(vec![make_book(1, "Tala", "/tala.epub")]));

    let id = BookId(1);
    let first = Instant::now();
    assert!(state.request_kindle());
    state.answer_confirm(true);
    let result = call(server.uri(), move |c| c.send_to_kindle(id)).await?;
    state.apply_kindle(id, result, first);

    assert!(state.request_kindle());
    state.answer_confirm(true);
    assert!(!state.expire_messages(first + Duration::from_secs(6)));
    assert_eq!(state.kindle.message(id), Some(library::MSG_KINDLE_SENDING));

    let result = call(server.uri(), move |c| c.send_to_kindle(id)).await?;
    let second = first + Duration::from_secs(8);
    state.apply_kindle(id, result, second);
    assert!(!state.expire_messages(second + Duration::from_secs(5)));
    assert_eq!(state.kindle.message(id), Some(library::MSG_KINDLE_SENT));
    assert!(state.expire_messages(second + Duration::from_secs(6)));
    assert_eq!(state.kindle.message(id), None);
    Ok(())
}

#[tokio::test]
async fn reader_pages_through_downloaded_epub() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let long = format!("<p>{}</p>", "palabra ".repeat(60));
    let bytes = build_epub("Desolación", &["<p>Primer capítulo.</p>", long.as_str()])?;
    Mock::given(method("GET"))
        .and(path("/books/download/9"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .expect(1)
        .mount(&server)
        .await;

    let mut reader = ReaderState::new(BookId(9));
    let downloaded = call(server.uri(), |c| c.download_book(BookId(9))).await?;
    let book = EpubBook::parse(&downloaded.map_err(|f| anyhow::anyhow!("{f}"))?)?;
    reader.finish_load(Ok(book.title.clone().unwrap_or_default()));
    assert_eq!(reader.title.as_deref(), Some("Desolación"));
    assert_eq!(reader.status_message(), None);

    let pagination = book.paginate(40, 3);
    let counts = pagination.page_counts();
    assert_eq!(counts[0], 1);
    assert!(counts[1] > 1);

    assert!(reader.next_page(&counts));
    assert_eq!((reader.position.chapter, reader.position.page), (1, 0));
    let (current, total) = reader.progress(&counts);
    assert_eq!(current, 2);
    assert_eq!(total, counts.iter().sum::<usize>());

    // A wider window has fewer pages; the position is clamped, not reset.
    reader.position.page = counts[1] - 1;
    let wider = book.paginate(200, 3).page_counts();
    reader.clamp(&wider);
    assert_eq!(reader.position.chapter, 1);
    assert!(reader.position.page < wider[1]);
    Ok(())
}

#[test]
fn settings_survive_restart_and_drive_context() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("libreria.db");
    {
        let storage = Storage::open(&db)?;
        let mut settings = make_settings("http://biblioteca.local:8001/");
        settings.theme = Theme::Light;
        settings.download_dir = dir.path().display().to_string();
        storage.save_settings(&settings)?;
    }

    let storage = Storage::open(&db)?;
    let settings = storage.load_settings()?;
    assert_eq!(settings.api_url, "http://biblioteca.local:8001");
    assert_eq!(settings.theme, Theme::Light);

    let mut ctx = AppContext::new(settings);
    assert_eq!(ctx.download_dir(), dir.path());
    let epoch = ctx.epoch();
    assert!(ctx.navigate(Route::Library(LibraryFilters::category("Poesía"))));
    assert!(!ctx.is_current(epoch));
    assert!(ctx.back());
    assert_eq!(ctx.route, Route::default());
    Ok(())
}
