use crate::arc_client::Operation;
use crate::command::{Action, Args, CommandProcessor, Grammar, Tok};
use crate::protocol::arc::NAME_MAX_LEN;

type Built = Result<Action<Operation>, String>;

fn issue(description: impl Into<String>, operation: Operation) -> Built {
  Ok(Action::Issue { description: description.into(), operation })
}

fn channel_number(args: &Args, index: usize) -> Result<u16, String> {
  match args.number::<u16>(index)? {
    0 => Err("channel numbers start at 1".to_owned()),
    n => Ok(n),
  }
}

fn check_name(name: &str, what: &str) -> Result<(), String> {
  if name.is_empty() || name.len() > NAME_MAX_LEN {
    return Err(format!("{what} name must be 1 to {NAME_MAX_LEN} bytes long"));
  }
  Ok(())
}

fn ping(_: &Args) -> Built {
  issue("Ping", Operation::ChannelCounts)
}

fn names(_: &Args) -> Built {
  issue("Device names", Operation::DeviceNames)
}

fn name(_: &Args) -> Built {
  issue("Device name", Operation::DeviceName)
}

fn rx_channels(args: &Args) -> Built {
  let start = if args.is_empty() { 1 } else { channel_number(args, 0)? };
  issue(format!("RX channels from {start}"), Operation::RxChannels { start })
}

fn tx_channels(args: &Args) -> Built {
  let start = if args.is_empty() { 1 } else { channel_number(args, 0)? };
  issue(format!("TX channels from {start}"), Operation::TxChannels { start, friendly: false })
}

fn tx_friendly_names(args: &Args) -> Built {
  let start = if args.is_empty() { 1 } else { channel_number(args, 0)? };
  issue(format!("TX friendly names from {start}"), Operation::TxChannels { start, friendly: true })
}

fn subscribe_at(args: &Args) -> Built {
  let rx_channel = channel_number(args, 0)?;
  let source = args.word(1)?;
  let Some((tx_channel, tx_device)) = source.split_once('@') else {
    return Err(format!("'{source}' is not CHANNEL@DEVICE"));
  };
  subscribe(rx_channel, tx_channel, tx_device)
}

fn subscribe_split(args: &Args) -> Built {
  subscribe(channel_number(args, 0)?, args.word(1)?, args.word(2)?)
}

fn subscribe(rx_channel: u16, tx_channel: &str, tx_device: &str) -> Built {
  check_name(tx_channel, "tx channel")?;
  check_name(tx_device, "tx device")?;
  issue(
    format!("Subscribe {rx_channel} to {tx_channel}@{tx_device}"),
    Operation::Subscribe { rx_channel, tx_channel: tx_channel.to_owned(), tx_device: tx_device.to_owned() },
  )
}

fn unsubscribe(args: &Args) -> Built {
  let rx_channel = channel_number(args, 0)?;
  issue(format!("Unsubscribe {rx_channel}"), Operation::Unsubscribe { rx_channel })
}

fn identity(_: &Args) -> Built {
  issue("Identity", Operation::Identity)
}

/// Interactive commands of the console, in usage order.
pub fn grammars() -> Vec<Grammar<Operation>> {
  vec![
    Grammar::new('p', &[Tok::Lit("p")], "p                         ping (channel counts)", ping),
    Grammar::new('n', &[Tok::Lit("n")], "n                         device names (friendly, factory, board)", names),
    Grammar::new('N', &[Tok::Lit("N")], "N                         friendly device name", name),
    Grammar::new('r', &[Tok::Lit("r")], "r [START]                 rx channels and their subscriptions", rx_channels),
    Grammar::new('r', &[Tok::Lit("r"), Tok::Uint], "", rx_channels),
    Grammar::new('t', &[Tok::Lit("t"), Tok::Lit("f")], "t f [START]               tx channel friendly names", tx_friendly_names),
    Grammar::new('t', &[Tok::Lit("t"), Tok::Lit("f"), Tok::Uint], "", tx_friendly_names),
    Grammar::new('t', &[Tok::Lit("t")], "t [START]                 tx channel default names", tx_channels),
    Grammar::new('t', &[Tok::Lit("t"), Tok::Uint], "", tx_channels),
    Grammar::new('s', &[Tok::Lit("s"), Tok::Uint, Tok::Lit("-")], "s RX -                    unsubscribe rx channel RX", unsubscribe),
    Grammar::new('s', &[Tok::Lit("s"), Tok::Uint, Tok::Word], "s RX TXCHANNEL@TXDEVICE   subscribe rx channel RX", subscribe_at),
    Grammar::new('s', &[Tok::Lit("s"), Tok::Uint, Tok::Word, Tok::Word], "s RX TXCHANNEL TXDEVICE   subscribe rx channel RX", subscribe_split),
    Grammar::new('c', &[Tok::Lit("c")], "c                         device identity (CMC)", identity),
  ]
}

pub fn processor() -> CommandProcessor<Operation> {
  CommandProcessor::with_builtins(grammars())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  fn op(line: &str) -> Operation {
    match processor().parse(line) {
      Action::Issue { operation, .. } => operation,
      other => panic!("'{line}' gave {other:?}"),
    }
  }

  #[rstest]
  #[case("p", Operation::ChannelCounts)]
  #[case("n", Operation::DeviceNames)]
  #[case("N", Operation::DeviceName)]
  #[case("c", Operation::Identity)]
  #[case("r", Operation::RxChannels { start: 1 })]
  #[case("r 17", Operation::RxChannels { start: 17 })]
  #[case("t", Operation::TxChannels { start: 1, friendly: false })]
  #[case("t 5", Operation::TxChannels { start: 5, friendly: false })]
  #[case("t f", Operation::TxChannels { start: 1, friendly: true })]
  #[case("t f 9", Operation::TxChannels { start: 9, friendly: true })]
  #[case("s 2 -", Operation::Unsubscribe { rx_channel: 2 })]
  fn lines_map_to_operations(#[case] line: &str, #[case] expected: Operation) {
    assert_eq!(op(line), expected);
  }

  #[test]
  fn subscribe_forms() {
    let expected = Operation::Subscribe { rx_channel: 3, tx_channel: "01".to_owned(), tx_device: "stagebox".to_owned() };
    assert_eq!(op("s 3 01@stagebox"), expected);
    assert_eq!(op("s 3 01 stagebox"), expected);
    assert_eq!(
      op("s 3 \"Vocal L\" \"FOH mixer\""),
      Operation::Subscribe { rx_channel: 3, tx_channel: "Vocal L".to_owned(), tx_device: "FOH mixer".to_owned() }
    );
  }

  #[test]
  fn dash_means_unsubscribe_not_a_channel_name() {
    // "s RX -" and "s RX TXCHANNEL@TXDEVICE" both accept this line
    assert_eq!(op("s 4 -"), Operation::Unsubscribe { rx_channel: 4 });
  }

  #[rstest]
  #[case("r 0", 'r')]
  #[case("s 0 -", 's')]
  #[case("s 1 nodevice", 's')]
  #[case("s 1 01@", 's')]
  #[case("t f 70000", 't')]
  fn invalid_arguments_are_rejected(#[case] line: &str, #[case] family: char) {
    assert!(matches!(processor().parse(line), Action::Reject { family: f, .. } if f == family));
  }

  #[test]
  fn overlong_names_are_rejected() {
    let line = format!("s 1 01@{}", "d".repeat(NAME_MAX_LEN + 1));
    assert!(matches!(processor().parse(&line), Action::Reject { family: 's', .. }));
  }

  #[test]
  fn ping_is_described_as_ping() {
    assert_eq!(processor().parse("p"), Action::Issue { description: "Ping".to_owned(), operation: Operation::ChannelCounts });
  }
}
