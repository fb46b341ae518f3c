mod memory_broker_test;
