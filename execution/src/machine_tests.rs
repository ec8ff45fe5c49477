//! End-to-end match scenarios driven through `MatchStateMachine`.

use crate::dice::DiceRoller;
use crate::error::{ActionError, SettlementError};
use crate::ledger::{Ledger, MemoryLedger};
use crate::machine::{GameState, MatchStateMachine, Transition};
use crate::mocks::{Scripted, ScriptedEngine};
use crate::settlement::SettlementEngine;
use commonware_codec::Encode;
use std::sync::Arc;
use wagerhall_types::constants::DICE_COUNT;
use wagerhall_types::{
    Action, ActionRequest, Category, Die, FeeReceipt, ForfeitReason, GameType, LedgerCause,
    LedgerDraft, LedgerEntryType, MatchConfig, MatchStatus, StateConflict, UserId,
    ValidationError,
};

const FEE: u64 = 1_000;

fn config(game_type: GameType, max_players: u8, entry_fee: u64) -> MatchConfig {
    MatchConfig {
        game_type,
        entry_fee,
        max_players,
        platform_fee_bps: 500,
    }
}

fn receipt(user: &str, amount: u64) -> FeeReceipt {
    FeeReceipt {
        payment_ref: format!("pay-{user}"),
        amount,
    }
}

fn user(name: &str) -> UserId {
    UserId::from(name)
}

fn yahtzee(id: u64, seed: u64, players: &[&str]) -> MatchStateMachine {
    let mut machine = MatchStateMachine::new(
        id,
        &config(GameType::Yahtzee, players.len() as u8, FEE),
        seed,
        10,
        None,
    )
    .unwrap();
    for (i, name) in players.iter().enumerate() {
        machine
            .join(user(name), receipt(name, FEE), false, 20 + i as u64)
            .unwrap();
    }
    machine
}

fn chess(engine: ScriptedEngine) -> MatchStateMachine {
    let mut machine = MatchStateMachine::new(
        7,
        &config(GameType::Chess, 2, FEE),
        0,
        10,
        Some(Arc::new(engine)),
    )
    .unwrap();
    machine.join(user("white"), receipt("white", FEE), false, 11).unwrap();
    machine.join(user("black"), receipt("black", FEE), false, 12).unwrap();
    machine
}

fn act(machine: &mut MatchStateMachine, actor: &str, action: Action) -> Result<Transition, ActionError> {
    machine.apply(&ActionRequest::new(user(actor), action), 100)
}

fn yahtzee_state(machine: &MatchStateMachine) -> &crate::yahtzee::YahtzeeState {
    match machine.game() {
        Some(GameState::Yahtzee(state)) => state,
        other => panic!("expected yahtzee state, got {other:?}"),
    }
}

/// Seed whose first roll for seat 0 in round 1 comes up `target`.
fn seed_rolling(target: [u8; DICE_COUNT]) -> u64 {
    (0..1_000_000u64)
        .find(|seed| {
            let mut dice = [Die::default(); DICE_COUNT];
            DiceRoller::new(*seed).roll(&mut dice, 0, 1, 1);
            dice.map(|die| die.value) == target
        })
        .expect("a seed within range rolls the target")
}

/// Let bots act until nobody bot-controlled holds the turn.
fn drive_bots(machine: &mut MatchStateMachine) {
    for _ in 0..10_000 {
        let Some(request) = machine.bot_action() else {
            return;
        };
        if machine.apply(&request, 100).is_err() {
            let fallback = machine.bot_fallback().expect("bot still holds the turn");
            machine.apply(&fallback, 100).unwrap();
        }
    }
    panic!("bots did not finish");
}

#[test]
fn yahtzee_on_first_roll_scores_fifty_and_passes_turn() {
    let seed = seed_rolling([5; DICE_COUNT]);
    let mut machine = yahtzee(1, seed, &["p1", "p2"]);
    assert_eq!(machine.current_turn(), Some(&user("p1")));

    act(&mut machine, "p1", Action::Roll).unwrap();
    assert_eq!(yahtzee_state(&machine).seats[0].turn.values(), [5; DICE_COUNT]);

    let transition = act(
        &mut machine,
        "p1",
        Action::Score {
            category: Category::Yahtzee,
        },
    )
    .unwrap();
    assert_eq!(transition, Transition::Applied);

    let state = yahtzee_state(&machine);
    assert_eq!(state.seats[0].scoreboard.get(Category::Yahtzee), Some(50));
    assert!(!state.seats[0].scoreboard.is_open(Category::Yahtzee));
    assert_eq!(state.current_seat, 1);
    assert_eq!(machine.current_turn(), Some(&user("p2")));

    // p1 must wait for p2; the category stays spent either way.
    let err = act(&mut machine, "p1", Action::Roll).unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::NotYourTurn));
}

#[test]
fn scoring_a_used_category_is_rejected_without_mutation() {
    let mut machine = yahtzee(2, 3, &["p1", "p2"]);
    for actor in ["p1", "p2"] {
        act(&mut machine, actor, Action::Roll).unwrap();
        act(&mut machine, actor, Action::Score { category: Category::Chance }).unwrap();
    }
    act(&mut machine, "p1", Action::Roll).unwrap();
    let before = machine.snapshot();
    let err = act(&mut machine, "p1", Action::Score { category: Category::Chance }).unwrap_err();
    assert_eq!(
        err,
        ActionError::Invalid(ValidationError::CategoryAlreadyUsed(Category::Chance))
    );
    assert_eq!(machine.snapshot(), before);
    assert_eq!(yahtzee_state(&machine).round, 2);
}

#[test]
fn joins_fill_then_start() {
    let mut machine =
        MatchStateMachine::new(3, &config(GameType::Yahtzee, 3, 500), 1, 10, None).unwrap();
    assert_eq!(machine.status(), MatchStatus::Open);

    let first = machine.join(user("a"), receipt("a", 500), false, 11).unwrap();
    assert_eq!(first, Transition::Applied);
    assert_eq!(machine.status(), MatchStatus::Filling);

    let dup = machine.join(user("a"), receipt("a", 500), false, 12).unwrap_err();
    assert_eq!(dup, ActionError::Invalid(ValidationError::AlreadyJoined));

    let short = machine.join(user("b"), receipt("b", 499), false, 12).unwrap_err();
    assert_eq!(
        short,
        ActionError::Invalid(ValidationError::EntryFeeMismatch {
            expected: 500,
            got: 499
        })
    );

    machine.join(user("b"), receipt("b", 500), false, 12).unwrap();
    let started = machine.join(user("c"), receipt("c", 500), false, 13).unwrap();
    assert_eq!(started, Transition::Started);

    let record = machine.record();
    assert_eq!(record.status, MatchStatus::Running);
    assert_eq!(record.prize_amount, 1_425);
    assert_eq!(record.platform_fee, 75);
    assert_eq!(record.started_at, Some(13));
    assert_eq!(machine.current_turn(), Some(&user("a")));

    let full = machine.join(user("d"), receipt("d", 500), false, 14).unwrap_err();
    assert!(matches!(
        full,
        ActionError::Conflict(StateConflict::MatchAlreadyStarted { match_id: 3, .. })
    ));
}

#[test]
fn leaving_refunds_and_last_one_out_cancels() {
    let mut machine =
        MatchStateMachine::new(4, &config(GameType::Yahtzee, 4, 500), 1, 10, None).unwrap();
    machine.join(user("a"), receipt("a", 500), false, 11).unwrap();
    machine.join(user("b"), receipt("b", 500), false, 12).unwrap();

    let refund = machine.leave(&user("a"), 13).unwrap();
    assert_eq!(refund.amount, 500);
    assert_eq!(refund.draft().amount, 500);
    assert_eq!(refund.draft().kind, LedgerEntryType::Refund);
    assert_eq!(machine.participants()[0].user_id, user("b"));
    assert_eq!(machine.participants()[0].seat, 0);
    assert_eq!(machine.record().current_players, 1);

    let again = machine.join(user("a"), receipt("a", 500), false, 14).unwrap_err();
    assert_eq!(again, ActionError::Invalid(ValidationError::AlreadyLeft));

    machine.leave(&user("b"), 15).unwrap();
    assert_eq!(machine.status(), MatchStatus::Cancelled);
    assert_eq!(machine.record().completed_at, Some(15));
    assert!(machine.leave(&user("b"), 16).is_err());
}

#[test]
fn fill_timeout_refunds_everyone_seated() {
    let mut machine =
        MatchStateMachine::new(5, &config(GameType::Yahtzee, 4, 500), 1, 10, None).unwrap();
    machine.join(user("a"), receipt("a", 500), false, 11).unwrap();
    machine.join(user("b"), receipt("b", 500), false, 12).unwrap();

    let refunds = machine.cancel_unfilled(20).unwrap();
    assert_eq!(refunds.len(), 2);
    assert!(refunds.iter().all(|refund| refund.amount == 500));
    assert_eq!(machine.status(), MatchStatus::Cancelled);

    let err = machine
        .join(user("c"), receipt("c", 500), false, 21)
        .unwrap_err();
    assert!(matches!(err, ActionError::Conflict(StateConflict::MatchAlreadyStarted { .. })));
}

#[test]
fn stale_version_is_rejected_without_mutation() {
    let mut machine = yahtzee(6, 1, &["p1", "p2"]);
    let version = machine.version();
    act(&mut machine, "p1", Action::Roll).unwrap();
    let before = machine.snapshot();

    let stale = ActionRequest::new(user("p1"), Action::Roll).at_version(version);
    let err = machine.apply(&stale, 100).unwrap_err();
    assert_eq!(
        err,
        ActionError::Conflict(StateConflict::StaleVersion {
            expected: version,
            current: version + 1
        })
    );
    assert_eq!(machine.snapshot(), before);

    let fresh = ActionRequest::new(user("p1"), Action::Roll).at_version(version + 1);
    machine.apply(&fresh, 100).unwrap();
    assert_eq!(machine.version(), version + 2);
}

#[test]
fn wrong_game_and_strangers_are_rejected() {
    let mut machine = yahtzee(8, 1, &["p1", "p2"]);
    let err = act(&mut machine, "nobody", Action::Roll).unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::NotAParticipant));

    let err = act(
        &mut machine,
        "p1",
        Action::Move {
            from: "e2".parse().unwrap(),
            to: "e4".parse().unwrap(),
            promotion: None,
        },
    )
    .unwrap_err();
    assert_eq!(
        err,
        ActionError::Invalid(ValidationError::WrongGame {
            expected: GameType::Yahtzee,
            got: GameType::Chess
        })
    );

    let err = act(&mut machine, "p1", Action::Score { category: Category::Ones }).unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::MustRollFirst));
}

#[tokio::test]
async fn forfeit_mid_match_loses_the_entry_fee() {
    let mut machine = yahtzee(9, 11, &["p1", "p2"]);
    for _ in 0..3 {
        for actor in ["p1", "p2"] {
            act(&mut machine, actor, Action::Roll).unwrap();
            let category = crate::yahtzee::first_open(
                yahtzee_state(&machine).current().unwrap(),
            )
            .unwrap();
            act(&mut machine, actor, Action::Score { category }).unwrap();
        }
    }
    let p2_partial = yahtzee_state(&machine).seats[1].scoreboard.total();

    // p2 forfeits out of turn; the match ends with one active player.
    let transition = act(
        &mut machine,
        "p2",
        Action::Forfeit {
            reason: ForfeitReason::Timeout,
        },
    )
    .unwrap();
    assert_eq!(transition, Transition::Completed);
    assert_eq!(machine.status(), MatchStatus::Completed);
    assert!(machine.awaiting_settlement());

    let engine = SettlementEngine::new(Arc::new(MemoryLedger::new()));
    let result = machine.settle(&engine).await.unwrap();
    let p2 = result.row(&user("p2")).unwrap();
    assert!(p2.forfeited);
    assert_eq!(p2.total_score, p2_partial);
    assert_eq!(p2.net_change, -(FEE as i64));
    assert_eq!(result.winner_id, Some(user("p1")));
    assert_eq!(result.row(&user("p1")).unwrap().net_change, 1_900 - FEE as i64);
    assert_eq!(machine.record().winner_id, Some(user("p1")));
    assert_eq!(result.balance_check(), 0);
}

#[tokio::test]
async fn forfeits_in_larger_matches_skip_the_seat() {
    let mut machine = yahtzee(10, 2, &["p1", "p2", "p3"]);
    act(&mut machine, "p1", Action::Forfeit { reason: ForfeitReason::Left }).unwrap();
    assert_eq!(machine.status(), MatchStatus::Running);
    assert_eq!(machine.current_turn(), Some(&user("p2")));

    let err = act(&mut machine, "p1", Action::Roll).unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::AlreadyForfeited));

    act(&mut machine, "p2", Action::Roll).unwrap();
    act(&mut machine, "p2", Action::Score { category: Category::Chance }).unwrap();
    assert_eq!(machine.current_turn(), Some(&user("p3")));
    act(&mut machine, "p3", Action::Roll).unwrap();
    act(&mut machine, "p3", Action::Score { category: Category::Chance }).unwrap();
    assert_eq!(machine.current_turn(), Some(&user("p2")));
    assert_eq!(yahtzee_state(&machine).round, 2);
}

#[tokio::test]
async fn forfeit_on_the_last_open_turn_completes_the_match() {
    let mut machine = yahtzee(11, 5, &["p1", "p2", "p3"]);
    let turns = Category::ALL.len() * 3 - 1;
    for _ in 0..turns {
        let actor = machine.current_turn().unwrap().clone();
        act(&mut machine, actor.as_str(), Action::Roll).unwrap();
        let category = crate::yahtzee::first_open(
            yahtzee_state(&machine).current().unwrap(),
        )
        .unwrap();
        act(&mut machine, actor.as_str(), Action::Score { category }).unwrap();
    }
    assert_eq!(machine.status(), MatchStatus::Running);
    assert_eq!(machine.current_turn(), Some(&user("p3")));

    let transition = act(
        &mut machine,
        "p3",
        Action::Forfeit {
            reason: ForfeitReason::Timeout,
        },
    )
    .unwrap();
    assert_eq!(transition, Transition::Completed);
    assert_eq!(machine.status(), MatchStatus::Completed);
    assert_eq!(machine.current_turn(), None);
    assert!(machine.awaiting_settlement());

    let engine = SettlementEngine::new(Arc::new(MemoryLedger::new()));
    let result = machine.settle(&engine).await.unwrap();
    let p3 = result.row(&user("p3")).unwrap();
    assert!(p3.forfeited);
    assert_eq!(p3.net_change, -(FEE as i64));
    assert_ne!(result.winner_id, Some(user("p3")));
    assert_eq!(result.balance_check(), 0);
    assert!(machine.snapshot().is_final());
}

#[tokio::test]
async fn four_bots_play_to_completion_and_settle() {
    let mut machine =
        MatchStateMachine::new(11, &config(GameType::Yahtzee, 4, 500), 42, 10, None).unwrap();
    for name in ["b1", "b2", "b3", "b4"] {
        machine.join(user(name), receipt(name, 500), true, 11).unwrap();
    }
    drive_bots(&mut machine);
    assert_eq!(machine.status(), MatchStatus::Completed);
    assert!(yahtzee_state(&machine)
        .seats
        .iter()
        .all(|seat| seat.scoreboard.is_complete()));

    let ledger = Arc::new(MemoryLedger::new());
    let engine = SettlementEngine::new(ledger.clone());
    let result = machine.settle(&engine).await.unwrap();
    assert_eq!(result.prize_amount, 1_900);
    assert_eq!(result.platform_fee, 100);

    let ranks: Vec<u32> = result.rows.iter().map(|row| row.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
    let winner = &result.rows[0];
    assert_eq!(result.winner_id.as_ref(), Some(&winner.user_id));
    assert_eq!(winner.net_change, 1_400);
    assert!(result.rows[1..].iter().all(|row| row.net_change == -500));
    assert!(result
        .rows
        .windows(2)
        .all(|pair| pair[0].total_score >= pair[1].total_score));
    assert_eq!(result.balance_check(), 0);
    assert_eq!(
        ledger.count(LedgerCause::Match(11), LedgerEntryType::PrizeCredit),
        1
    );
}

#[tokio::test]
async fn settling_twice_is_byte_identical() {
    let mut machine = yahtzee(12, 5, &["p1", "p2"]);
    act(&mut machine, "p1", Action::Resign).unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    let engine = SettlementEngine::new(ledger.clone());
    let first = machine.settle(&engine).await.unwrap();
    let version = machine.version();
    let second = machine.settle(&engine).await.unwrap();
    assert_eq!(first.encode(), second.encode());
    assert_eq!(machine.version(), version);

    // A fresh engine call for the same match reads the stored result.
    let request = machine.settlement_request().unwrap();
    let third = engine.settle(&request).await.unwrap();
    assert_eq!(first.encode(), third.encode());

    assert_eq!(ledger.entries().len(), 1);
    assert_eq!(ledger.balance(&user("p2")).await.unwrap(), 1_900);
}

#[tokio::test]
async fn settle_before_completion_is_refused() {
    let mut machine = yahtzee(13, 5, &["p1", "p2"]);
    let engine = SettlementEngine::new(Arc::new(MemoryLedger::new()));
    let err = machine.settle(&engine).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotCompleted(13)));
}

#[tokio::test]
async fn orphaned_credit_flags_reconciliation() {
    let mut machine = yahtzee(14, 5, &["p1", "p2"]);
    act(&mut machine, "p1", Action::Resign).unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    ledger
        .append(LedgerDraft {
            user_id: user("p2"),
            cause: LedgerCause::Match(14),
            kind: LedgerEntryType::PrizeCredit,
            amount: 1_900,
        })
        .await
        .unwrap();
    let engine = SettlementEngine::new(ledger.clone());

    let err = machine.settle(&engine).await.unwrap_err();
    assert!(matches!(err, SettlementError::ReconciliationRequired { match_id: 14, .. }));
    assert!(machine.needs_reconciliation());
    assert!(!machine.awaiting_settlement());
    assert!(machine.snapshot().needs_reconciliation);

    let again = machine.settle(&engine).await.unwrap_err();
    assert!(matches!(again, SettlementError::ReconciliationRequired { .. }));
    assert_eq!(ledger.result(14).await.unwrap(), None);
    assert_eq!(ledger.entries().len(), 1);
}

#[test]
fn completed_match_rejects_actions() {
    let mut machine = yahtzee(15, 5, &["p1", "p2"]);
    act(&mut machine, "p2", Action::Resign).unwrap();
    let version = machine.version();
    let err = act(&mut machine, "p1", Action::Roll).unwrap_err();
    assert!(matches!(
        err,
        ActionError::Conflict(StateConflict::MatchNotRunning {
            status: MatchStatus::Completed,
            ..
        })
    ));
    assert_eq!(machine.version(), version);
    assert_eq!(machine.current_turn(), None);
}

#[test]
fn chess_requires_an_engine() {
    let err = MatchStateMachine::new(16, &config(GameType::Chess, 2, FEE), 0, 10, None)
        .err()
        .unwrap();
    assert_eq!(err, ValidationError::InvalidConfig("chess_engine"));
}

#[tokio::test]
async fn chess_checkmate_pays_the_mover() {
    let engine = ScriptedEngine::new()
        .allow("f2", "f3")
        .allow("e7", "e5")
        .allow("g2", "g4")
        .script("d8", "h4", Scripted::Checkmate);
    let mut machine = chess(engine);

    let illegal = act(
        &mut machine,
        "white",
        Action::Move {
            from: "e2".parse().unwrap(),
            to: "e5".parse().unwrap(),
            promotion: None,
        },
    )
    .unwrap_err();
    assert!(matches!(illegal, ActionError::Invalid(ValidationError::IllegalMove { .. })));

    for (actor, from, to) in [
        ("white", "f2", "f3"),
        ("black", "e7", "e5"),
        ("white", "g2", "g4"),
        ("black", "d8", "h4"),
    ] {
        act(
            &mut machine,
            actor,
            Action::Move {
                from: from.parse().unwrap(),
                to: to.parse().unwrap(),
                promotion: None,
            },
        )
        .unwrap();
    }
    assert_eq!(machine.status(), MatchStatus::Completed);

    let engine = SettlementEngine::new(Arc::new(MemoryLedger::new()));
    let result = machine.settle(&engine).await.unwrap();
    assert_eq!(result.winner_id, Some(user("black")));
    assert_eq!(result.row(&user("black")).unwrap().net_change, 900);
    assert_eq!(result.row(&user("white")).unwrap().net_change, -1_000);
}

#[test]
fn chess_enforces_turn_order() {
    let engine = ScriptedEngine::new().allow("e7", "e5");
    let mut machine = chess(engine);
    let err = act(
        &mut machine,
        "black",
        Action::Move {
            from: "e7".parse().unwrap(),
            to: "e5".parse().unwrap(),
            promotion: None,
        },
    )
    .unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::NotYourTurn));
    let err = act(&mut machine, "white", Action::Roll).unwrap_err();
    assert!(matches!(err, ActionError::Invalid(ValidationError::WrongGame { .. })));
}

#[tokio::test]
async fn chess_draw_shares_the_prize() {
    let engine = ScriptedEngine::new().script("e2", "e4", Scripted::Draw);
    let mut machine = chess(engine);
    act(
        &mut machine,
        "white",
        Action::Move {
            from: "e2".parse().unwrap(),
            to: "e4".parse().unwrap(),
            promotion: None,
        },
    )
    .unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    let result = machine
        .settle(&SettlementEngine::new(ledger.clone()))
        .await
        .unwrap();
    assert_eq!(result.winner_id, None);
    assert!(result.rows.iter().all(|row| row.net_change == -50));
    assert_eq!(result.balance_check(), 0);
    assert_eq!(
        ledger.count(LedgerCause::Match(7), LedgerEntryType::PrizeCredit),
        2
    );
}

#[tokio::test]
async fn chess_resignation_hands_the_win_over() {
    let mut machine = chess(ScriptedEngine::new());
    act(&mut machine, "black", Action::Resign).unwrap();
    let result = machine
        .settle(&SettlementEngine::new(Arc::new(MemoryLedger::new())))
        .await
        .unwrap();
    assert_eq!(result.winner_id, Some(user("white")));
    assert!(result.row(&user("black")).unwrap().forfeited);
}

#[test]
fn chess_refuses_bots() {
    let mut machine = MatchStateMachine::new(
        17,
        &config(GameType::Chess, 2, FEE),
        0,
        10,
        Some(Arc::new(ScriptedEngine::new())),
    )
    .unwrap();
    let err = machine
        .join(user("bot"), receipt("bot", FEE), true, 11)
        .unwrap_err();
    assert_eq!(err, ActionError::Invalid(ValidationError::InvalidConfig("is_bot")));
}

#[test]
fn snapshot_serializes_with_match_record() {
    let machine = yahtzee(18, 1, &["p1", "p2"]);
    let json = serde_json::to_value(machine.snapshot()).unwrap();
    assert_eq!(json["match"]["id"], 18);
    assert_eq!(json["current_turn"], "p1");
    assert_eq!(json["state"]["game"], "yahtzee");
    assert_eq!(json["participants"].as_array().unwrap().len(), 2);
}
