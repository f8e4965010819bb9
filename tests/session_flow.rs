use super::*;
use crossterm::event::{
    Event,
    KeyCode,
    KeyEvent,
};
use dapp_console::{
    client,
    errors::{
        ActionError,
        ChainError,
        ChainErrorKind,
    },
    game::Move,
    provider::{
        Approval,
        ProviderEvent,
    },
    session::SessionState,
    ui,
    view::{
        NOTE_NEEDS_CONNECTION,
        PROVIDER_MISSING_ADVISORY,
        StatusLine,
        Tone,
    },
};
use futures::StreamExt;
use std::time::Duration;

fn keys(codes: Vec<KeyCode>) -> ui::InputEvents {
    futures::stream::iter(codes)
        .then(|code| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(Event::Key(KeyEvent::from(code)))
        })
        .boxed_local()
}

#[tokio::test]
async fn start__missing_provider_shows_advisory() {
    // given
    let (mut app, _rx) = app(None);

    // when
    app.start().await;
    let attempt = app.play(Move::Rock);

    // then
    assert!(attempt.is_none());
    assert_eq!(
        app.view().game.message,
        Some(StatusLine::new(
            ActionError::ProviderAbsent.to_string(),
            Tone::Error
        ))
    );
    assert_eq!(app.session().state(), SessionState::ProviderMissing);
    assert_eq!(
        app.view().connection.advisory.as_deref(),
        Some(PROVIDER_MISSING_ADVISORY)
    );
    assert!(!app.view().connection.connect_enabled);
}

#[tokio::test]
async fn handle_provider_event__empty_accounts_disconnects() {
    // given
    let chain = FakeChain::shared();
    let (wallet, mut provider_rx) = FakeWallet::authorized(chain.clone(), vec![alice()]);
    let (mut app, mut rx) = app(Some(wallet));
    let tasks = app.start().await;
    run_until_idle(&mut app, &mut rx, tasks).await;

    // when
    app.disconnect();
    let event = provider_rx.recv().await.unwrap();
    app.handle_provider_event(event).await;
    type_bet(&mut app, "0.01");
    let attempt = app.play(Move::Rock);

    // then
    assert!(attempt.is_none());
    assert_eq!(app.session().state(), SessionState::Disconnected);
    assert_eq!(
        app.view().game.message,
        Some(StatusLine::new(
            "Please connect your wallet first!",
            Tone::Error
        ))
    );
    assert_eq!(app.view().notes.display, NOTE_NEEDS_CONNECTION);
    assert_eq!(app.view().connection.connect_label, "Connect Wallet");
    assert!(chain.lock().unwrap().moves_submitted().is_empty());
}

#[tokio::test]
async fn connect__after_disconnect_binds_again() {
    // given
    let chain = FakeChain::shared();
    chain.lock().unwrap().set_note("still here");
    let (wallet, mut provider_rx) = FakeWallet::authorized(chain.clone(), vec![alice()]);
    let (mut app, mut rx) = app(Some(wallet));
    app.start().await;
    app.disconnect();
    let event = provider_rx.recv().await.unwrap();
    app.handle_provider_event(event).await;

    // when
    let tasks = app.connect(Approval::Granted(FAKE_PASSWORD.into()));
    run_until_idle(&mut app, &mut rx, tasks).await;

    // then
    assert_eq!(app.session().state(), SessionState::Connected(alice()));
    assert_eq!(app.view().notes.display, "still here");
}

#[tokio::test]
async fn handle_provider_event__disconnect_discards_reads_still_in_flight() {
    // given
    let chain = FakeChain::shared();
    chain.lock().unwrap().set_note("secret");
    let (wallet, mut provider_rx) = FakeWallet::authorized(chain.clone(), vec![alice()]);
    let (mut app, mut rx) = app(Some(wallet));
    let started = app.start().await;

    // when
    app.disconnect();
    let event = provider_rx.recv().await.unwrap();
    app.handle_provider_event(event).await;
    run_until_idle(&mut app, &mut rx, started).await;

    // then
    assert_eq!(app.session().state(), SessionState::Disconnected);
    assert_eq!(app.view().notes.display, NOTE_NEEDS_CONNECTION);
    assert_eq!(app.view().game.bounds, None);
    assert!(app.view().game.bet_input.is_empty());
}

#[tokio::test]
async fn handle_provider_event__new_account_reloads_note_and_bounds() {
    // given
    let chain = FakeChain::shared();
    chain.lock().unwrap().set_note("alice was here");
    let (wallet, _provider_rx) =
        FakeWallet::authorized(chain.clone(), vec![alice(), bob()]);
    let (mut app, mut rx) = app(Some(wallet));
    let tasks = app.start().await;
    run_until_idle(&mut app, &mut rx, tasks).await;
    assert_eq!(app.view().notes.display, "alice was here");
    {
        let mut chain = chain.lock().unwrap();
        chain.set_note("bob was here");
        chain.set_bounds(Some(ether_milli(20)), Some(ether_milli(2000)));
    }

    // when
    let tasks = app
        .handle_provider_event(ProviderEvent::AccountsChanged(vec![bob()]))
        .await;
    run_until_idle(&mut app, &mut rx, tasks).await;

    // then
    let view = app.view();
    assert_eq!(app.session().state(), SessionState::Connected(bob()));
    assert_eq!(view.connection.wallet_status, "Connected: 0x2222...2222");
    assert_eq!(view.notes.display, "bob was here");
    assert_eq!(
        view.game.bounds.as_deref(),
        Some("Min: 0.02 tBNB | Max: 2 tBNB")
    );
    assert_eq!(view.game.bet_input, "0.02");
}

#[tokio::test]
async fn read_note__failure_shows_error_and_logs_it() {
    // given
    let chain = FakeChain::shared();
    let (mut app, mut rx) = connected_app(&chain).await;
    chain.lock().unwrap().fail_next_read(ChainError::new(
        ChainErrorKind::Other,
        "connection refused",
    ));

    // when
    let task = app.read_note();
    let loading = app.view().notes.display.clone();
    run_until_idle(&mut app, &mut rx, task.into_iter().collect()).await;

    // then
    assert_eq!(loading, "Loading...");
    assert_eq!(app.view().notes.display, "Error: connection refused");
    let logged = app.view().activity.back().unwrap();
    assert_eq!(logged.text, "Reading note failed: connection refused");
    assert_eq!(logged.tone, Tone::Error);
}

#[tokio::test]
async fn handle_provider_event__chain_change_resets_score() {
    // given
    let chain = FakeChain::shared();
    let (mut app, mut rx) = connected_app(&chain).await;
    chain.lock().unwrap().script_outcome(2, 1, ether_milli(20));
    type_bet(&mut app, "0.01");
    let tasks = app.play(Move::Rock).into_iter().collect();
    run_until_idle(&mut app, &mut rx, tasks).await;
    assert_eq!(app.view().game.score.user, 1);

    // when
    let tasks = app
        .handle_provider_event(ProviderEvent::ChainChanged(56))
        .await;
    run_until_idle(&mut app, &mut rx, tasks).await;

    // then
    assert_eq!(app.view().game.score.user, 0);
    assert_eq!(app.session().state(), SessionState::Connected(alice()));
    assert_eq!(app.view().game.bet_input, "0.01");
}

#[tokio::test]
async fn run_loop__keyboard_driven_move_updates_score() {
    // given
    let chain = FakeChain::shared();
    chain.lock().unwrap().script_outcome(2, 1, ether_milli(40));
    let (wallet, provider_rx) = FakeWallet::authorized(chain.clone(), vec![alice()]);
    let (mut app, rx) = app(Some(wallet));
    let mut ui_state = ui::UiState::default();
    let mut input = keys(vec![
        KeyCode::Tab,
        KeyCode::Char('b'),
        KeyCode::Backspace,
        KeyCode::Backspace,
        KeyCode::Backspace,
        KeyCode::Backspace,
        KeyCode::Char('0'),
        KeyCode::Char('.'),
        KeyCode::Char('0'),
        KeyCode::Char('2'),
        KeyCode::Enter,
        KeyCode::Char('r'),
        KeyCode::Char('q'),
        KeyCode::Char('y'),
    ]);

    // when
    client::run_loop(&mut app, &mut ui_state, &mut input, provider_rx, rx)
        .await
        .unwrap();

    // then
    assert_eq!(
        chain.lock().unwrap().moves_submitted(),
        [(Move::Rock, ether_milli(20))]
    );
    assert_eq!(app.view().game.score.user, 1);
    assert_eq!(
        app.view().game.message,
        Some(StatusLine::new("You won! Reward: 0.04 tBNB", Tone::Success))
    );
}
