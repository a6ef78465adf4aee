use docwire::DbError;

#[test]
fn error_messages_name_the_failure() {
    assert_eq!(DbError::Connection("closed".into()).to_string(), "Connection error: closed");
    assert_eq!(DbError::Configuration("bad".into()).to_string(), "Configuration error: bad");
    assert_eq!(DbError::Protocol("short".into()).to_string(), "Protocol error: short");
    assert_eq!(DbError::NotInitialized("db".into()).to_string(), "Not initialized: db");
    assert_eq!(
        DbError::Server { code: 13, message: "unauthorized".into() }.to_string(),
        "Server error 13: unauthorized"
    );
    assert_eq!(
        DbError::Timeout { seconds: 30 }.to_string(),
        "no reply from server within the query timeout of 30s"
    );
}

#[test]
fn only_timeouts_are_retriable() {
    assert!(DbError::Timeout { seconds: 1 }.is_retriable());
    assert!(!DbError::Connection(String::new()).is_retriable());
    assert!(!DbError::Protocol(String::new()).is_retriable());
}

#[test]
fn io_errors_convert() {
    let e: DbError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
    assert!(matches!(e, DbError::Io(_)));
    assert!(e.to_string().starts_with("I/O error"));
}
