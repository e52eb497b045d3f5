mod local_network_test;
