use super::*;
use crate::constants::{MAX_PLATFORM_FEE_BPS, UPPER_BONUS};
use commonware_codec::{Encode, EncodeSize, ReadExt};
use proptest::prelude::*;

fn sample_result() -> MatchResult {
    MatchResult {
        match_id: 7,
        game_type: GameType::Yahtzee,
        winner_id: Some(UserId::from("alice")),
        prize_amount: 1900,
        platform_fee: 100,
        completed_at: 1_700_000_000_000,
        rows: vec![
            ResultRow {
                user_id: UserId::from("alice"),
                rank: 1,
                total_score: 231,
                entry_fee: 500,
                net_change: 1400,
                forfeited: false,
            },
            ResultRow {
                user_id: UserId::from("bob"),
                rank: 2,
                total_score: 198,
                entry_fee: 500,
                net_change: -500,
                forfeited: false,
            },
        ],
    }
}

#[test]
fn test_match_result_decodes_to_identical_bytes() {
    let result = sample_result();
    let encoded = result.encode();
    let decoded = MatchResult::read(&mut &encoded[..]).unwrap();
    assert_eq!(decoded, result);
    assert_eq!(decoded.encode(), encoded, "re-encoding must be byte-identical");
}

#[test]
fn test_match_result_rejects_unknown_game() {
    let mut encoded = sample_result().encode().to_vec();
    // match_id is 8 bytes, game type follows.
    encoded[8] = 9;
    assert!(MatchResult::read(&mut &encoded[..]).is_err());
}

#[test]
fn test_ledger_entry_roundtrip() {
    let entry = LedgerEntry::from_draft(
        3,
        LedgerDraft {
            user_id: UserId::from("carol"),
            cause: LedgerCause::Match(12),
            kind: LedgerEntryType::PrizeCredit,
            amount: 1900,
        },
        42,
    );
    let encoded = entry.encode();
    assert_eq!(encoded.len(), entry.encode_size());
    assert_eq!(LedgerEntry::read(&mut &encoded[..]).unwrap(), entry);
}

#[test]
fn test_ledger_cause_display() {
    assert_eq!(LedgerCause::Match(5).to_string(), "match:5");
    assert_eq!(LedgerCause::Withdrawal(9).to_string(), "withdrawal:9");
}

#[test]
fn test_balance_check_is_zero_for_self_funded_match() {
    // Two losing rows of the four-player sample are omitted.
    assert_eq!(sample_result().balance_check(), 1000);
    let pool = PrizePool::compute(500, 4, 500).unwrap();
    let nets = [pool.prize_amount as i64 - 500, -500, -500, -500];
    assert_eq!(
        nets.iter().sum::<i64>() + pool.platform_fee as i64,
        0,
        "net changes plus the platform fee must balance"
    );
}

#[test]
fn test_prize_pool_five_percent() {
    let pool = PrizePool::compute(500, 4, 500).unwrap();
    assert_eq!(pool.collected, 2000);
    assert_eq!(pool.prize_amount, 1900);
    assert_eq!(pool.platform_fee, 100);
}

#[test]
fn test_prize_pool_rounds_toward_platform() {
    let pool = PrizePool::compute(333, 3, 250).unwrap();
    assert_eq!(pool.collected, 999);
    assert_eq!(pool.prize_amount, 974);
    assert_eq!(pool.platform_fee, 25);
}

#[test]
fn test_prize_pool_rejects_overflow() {
    assert!(PrizePool::compute(u64::MAX, 2, 500).is_none());
    assert!(PrizePool::compute(100, 2, 10_001).is_none());
}

#[test]
fn test_match_config_bounds() {
    let mut config = MatchConfig {
        game_type: GameType::Chess,
        entry_fee: 500,
        max_players: 2,
        platform_fee_bps: 500,
    };
    assert!(config.validate().is_ok());
    config.max_players = 3;
    assert_eq!(
        config.validate(),
        Err(ValidationError::InvalidConfig("max_players"))
    );
    config.max_players = 2;
    config.platform_fee_bps = MAX_PLATFORM_FEE_BPS + 1;
    assert_eq!(
        config.validate(),
        Err(ValidationError::InvalidConfig("platform_fee_bps"))
    );
}

#[test]
fn test_scoreboard_write_once() {
    let mut board = PlayerScoreboard::new();
    assert!(board.record(Category::Chance, 22));
    assert!(!board.record(Category::Chance, 30));
    assert_eq!(board.get(Category::Chance), Some(22));
    assert_eq!(board.filled(), 1);
}

#[test]
fn test_scoreboard_bonus_derived_from_upper() {
    let mut board = PlayerScoreboard::new();
    for (category, score) in [
        (Category::Ones, 3),
        (Category::Twos, 6),
        (Category::Threes, 9),
        (Category::Fours, 12),
        (Category::Fives, 15),
    ] {
        board.record(category, score);
    }
    assert_eq!(board.upper_subtotal(), 45);
    assert_eq!(board.upper_bonus(), 0);
    board.record(Category::Sixes, 18);
    assert_eq!(board.upper_subtotal(), 63);
    assert_eq!(board.upper_bonus(), UPPER_BONUS);
    board.record(Category::Yahtzee, 50);
    assert_eq!(board.total(), 63 + 35 + 50);
}

#[test]
fn test_scoreboard_wire_sentinel() {
    let mut board = PlayerScoreboard::new();
    board.record(Category::Yahtzee, 0);
    let wire = board.to_wire();
    assert_eq!(wire[Category::Yahtzee.index()], 0);
    assert_eq!(wire[Category::Ones.index()], -1);
    assert_eq!(PlayerScoreboard::from_wire(wire), Some(board));

    let mut bad = wire;
    bad[0] = -7;
    assert!(PlayerScoreboard::from_wire(bad).is_none());
}

#[test]
fn test_category_names_parse() {
    for category in Category::ALL {
        assert_eq!(category.as_str().parse::<Category>(), Ok(category));
    }
    assert_eq!(Category::Fours.face(), Some(4));
    assert_eq!(Category::Chance.face(), None);
}

#[test]
fn test_square_parsing() {
    let square: Square = "e4".parse().unwrap();
    assert_eq!((square.file(), square.rank()), (4, 3));
    assert_eq!(square.to_string(), "e4");
    assert!("i1".parse::<Square>().is_err());
    assert!("a9".parse::<Square>().is_err());
    assert!("a".parse::<Square>().is_err());
}

#[test]
fn test_action_json_shape() {
    let action: Action =
        serde_json::from_str(r#"{"type":"score","category":"full_house"}"#).unwrap();
    assert_eq!(
        action,
        Action::Score {
            category: Category::FullHouse
        }
    );
    let action: Action = serde_json::from_str(r#"{"type":"move","from":"e2","to":"e4"}"#).unwrap();
    assert_eq!(action.game_type(), Some(GameType::Chess));
    assert!(serde_json::from_str::<Action>(r#"{"type":"move","from":"e2","to":"z9"}"#).is_err());
}

#[test]
fn test_status_phases() {
    assert!(MatchStatus::Open.is_pre_start());
    assert!(MatchStatus::Waiting.is_pre_start());
    assert!(!MatchStatus::Running.is_pre_start());
    assert!(MatchStatus::Cancelled.is_terminal());
}

proptest! {
    #[test]
    fn prop_prize_never_exceeds_collected(
        fee in 0u64..=1_000_000,
        players in 2u8..=8,
        bps in 0u16..=MAX_PLATFORM_FEE_BPS,
    ) {
        let pool = PrizePool::compute(fee, players, bps).unwrap();
        prop_assert_eq!(pool.prize_amount + pool.platform_fee, pool.collected);
        prop_assert!(pool.prize_amount <= pool.collected);
    }
}
