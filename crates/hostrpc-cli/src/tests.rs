use super::*;

#[test]
fn test_cli_parse_serve_defaults() {
    let args: Cli = Cli::from_args(&["hostrpc"], &["serve"]).unwrap();
    match args.command {
        Commands::Serve(ServeArgs { bind, max_message_size }) => {
            assert!(bind.is_none());
            assert!(max_message_size.is_none());
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_cli_parse_serve_with_bind() {
    let args: Cli = Cli::from_args(
        &["hostrpc"],
        &["serve", "-b", "0.0.0.0:9001", "--max-message-size", "1024"],
    )
    .unwrap();
    match args.command {
        Commands::Serve(ServeArgs { bind, max_message_size }) => {
            assert_eq!(bind, Some("0.0.0.0:9001".to_string()));
            assert_eq!(max_message_size, Some(1024));
        }
        _ => panic!("Expected Serve command"),
    }
}

#[test]
fn test_cli_parse_call() {
    let args: Cli = Cli::from_args(&["hostrpc"], &["call", "127.0.0.1:7400", "Echo.echo"]).unwrap();
    match args.command {
        Commands::Call(CallArgs { server_address, target, args }) => {
            assert_eq!(server_address, "127.0.0.1:7400");
            assert_eq!(target, "Echo.echo");
            assert_eq!(args, "[]"); // default
        }
        _ => panic!("Expected Call command"),
    }
}

#[test]
fn test_cli_parse_call_with_short_args() {
    let args: Cli = Cli::from_args(
        &["hostrpc"],
        &["call", "127.0.0.1:7400", "Store.set", "-a", "[\"k\", 1]"],
    )
    .unwrap();
    match args.command {
        Commands::Call(CallArgs { target, args, .. }) => {
            assert_eq!(target, "Store.set");
            assert_eq!(args, "[\"k\", 1]");
        }
        _ => panic!("Expected Call command"),
    }
}

#[test]
fn test_cli_parse_watch() {
    let args: Cli = Cli::from_args(&["hostrpc"], &["watch", "127.0.0.1:7400", "Ticker", "tick"]).unwrap();
    match args.command {
        Commands::Watch(WatchArgs { server_address, module, event }) => {
            assert_eq!(server_address, "127.0.0.1:7400");
            assert_eq!(module, "Ticker");
            assert_eq!(event, "tick");
        }
        _ => panic!("Expected Watch command"),
    }
}

#[test]
fn test_cli_parse_watch_requires_event() {
    assert!(Cli::from_args(&["hostrpc"], &["watch", "127.0.0.1:7400", "Ticker"]).is_err());
}
