mod counter_cache_test;
mod relation_cache_test;
