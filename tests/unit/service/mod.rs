mod event_sourced_test;
